use crate::{
    error::ApiError,
    jwt::{Principal, SessionData},
    schema::{Id, Recipe, UserRole},
};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingList,
            ActionType::ManageOwnSubscriptions,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingList,
            ActionType::ManageOwnSubscriptions,
            ActionType::ManageAllRecipes,
        ],
    ),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    CreateRecipes,

    ManageOwnRecipes,
    ManageOwnFavorites,
    ManageOwnShoppingList,
    ManageOwnSubscriptions,

    ManageAllRecipes,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        // superusers act with the admin row regardless of their stored role
        let role = if session.is_admin() {
            &UserRole::Admin
        } else {
            &session.role
        };

        ACTION_TABLE
            .iter()
            .find_map(|(uid, actions)| {
                if role != uid {
                    return None;
                }

                Some(actions.contains(&self))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Resources that carry an owning author.
pub trait Authored {
    fn author_id(&self) -> Id;
}

impl Authored for Recipe {
    fn author_id(&self) -> Id {
        self.author_id
    }
}

/// Request-level gate: reads are unrestricted, writes need a session.
pub fn has_permission(principal: &Principal, access: Access) -> bool {
    match access {
        Access::Read => true,
        Access::Write => principal.session().is_some(),
    }
}

/// Object-level gate for writes and deletes.
pub fn can_modify<R: Authored>(principal: &Principal, resource: &R) -> bool {
    match principal.session() {
        None => false,
        Some(session) => {
            session.user_id == resource.author_id()
                || ActionType::ManageAllRecipes.authenticate(session)
        }
    }
}

pub fn authorize_modify<'a, R: Authored>(
    principal: &'a Principal,
    resource: &R,
) -> Result<&'a SessionData, ApiError> {
    if !has_permission(principal, Access::Write) {
        return Err(ApiError::Unauthenticated);
    }
    if !can_modify(principal, resource) {
        return Err(ApiError::forbidden());
    }

    principal.require()
}

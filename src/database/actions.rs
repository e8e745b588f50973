pub mod ingredients;
pub mod memberships;
pub mod recipes;
pub mod shopping_list;
pub mod tags;
pub mod users;

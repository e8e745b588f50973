use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use sqlx::{Pool, Sqlite};

use crate::{
    actions::{ingredients::ingredient_exists, tags::tag_exists},
    authentication::permissions::ActionType,
    constants::RECIPE_NAME_MAX_LENGTH,
    error::{ApiError, FieldErrors},
    jwt::Principal,
    media::ImageUpload,
    schema::Id,
};

/// Upper bound for amounts and cooking times, as stored in small integer columns.
pub const MAX_SMALL_INT: i64 = 32767;

const REQUIRED: &str = "This field is required.";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct IngredientForm {
    pub id: Option<Value>,
    pub amount: Option<Value>,
}

/// Recipe write payload as received on the wire.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeForm {
    pub ingredients: Option<Vec<IngredientForm>>,
    pub tags: Option<Vec<Value>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct ValidatedRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i64,
    /// `None` keeps the current image on update.
    pub image: Option<ImageUpload>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Update,
}

/// Integers arrive either as JSON numbers or numeric strings.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn positive_small_int(value: Option<&Value>) -> Result<i64, &'static str> {
    match value {
        None | Some(Value::Null) => Err(REQUIRED),
        Some(value) => match as_integer(value) {
            None => Err("A valid integer is required."),
            Some(n) if n <= 0 => Err("must be greater than zero"),
            Some(n) if n > MAX_SMALL_INT => Err("is too large"),
            Some(n) => Ok(n),
        },
    }
}

async fn validate_ingredients(
    items: Option<&[IngredientForm]>,
    errors: &mut FieldErrors,
    pool: &Pool<Sqlite>,
) -> Result<Vec<IngredientAmount>, ApiError> {
    let mut ingredients = vec![];

    let items = match items {
        None | Some([]) => {
            errors.add("ingredients", "Add at least one ingredient.");
            return Ok(ingredients);
        }
        Some(items) => items,
    };

    let mut seen = HashSet::new();
    for item in items {
        let Some(id) = item.id.as_ref().and_then(as_integer) else {
            errors.add("ingredients", "Invalid ingredient id.");
            break;
        };

        if !ingredient_exists(id, pool).await? {
            return Err(ApiError::NotFound(format!("Ingredient {id} not found.")));
        }

        if !seen.insert(id) {
            errors.add("ingredients", "Ingredients must be unique.");
            break;
        }

        match positive_small_int(item.amount.as_ref()) {
            Ok(amount) => ingredients.push(IngredientAmount { id, amount }),
            Err(reason) => {
                errors.add("ingredients", &format!("Ingredient amount {reason}."));
                break;
            }
        }
    }

    Ok(ingredients)
}

async fn validate_tags(
    items: Option<&[Value]>,
    errors: &mut FieldErrors,
    pool: &Pool<Sqlite>,
) -> Result<Vec<Id>, ApiError> {
    let mut tags = vec![];

    let items = match items {
        None | Some([]) => {
            errors.add("tags", "Select at least one tag.");
            return Ok(tags);
        }
        Some(items) => items,
    };

    for item in items {
        let Some(id) = as_integer(item) else {
            errors.add("tags", "Invalid tag id.");
            break;
        };

        if tags.contains(&id) {
            errors.add("tags", "Tags must be unique.");
            break;
        }

        if !tag_exists(id, pool).await? {
            return Err(ApiError::NotFound(format!("Tag {id} not found.")));
        }

        tags.push(id);
    }

    Ok(tags)
}

fn required_text(value: Option<&str>, field: &str, errors: &mut FieldErrors) -> String {
    match value.map(str::trim) {
        None | Some("") => {
            errors.add(field, REQUIRED);
            String::new()
        }
        Some(value) => value.to_string(),
    }
}

/// Checks a recipe payload on behalf of `principal`.
///
/// Ingredients, tags and cooking time are independent error keys: each group
/// stops at its first problem, and all groups are reported together. A
/// reference to an unknown ingredient or tag aborts with `NotFound`.
pub async fn validate_recipe_form(
    form: RecipeForm,
    principal: &Principal,
    mode: FormMode,
    pool: &Pool<Sqlite>,
) -> Result<ValidatedRecipe, ApiError> {
    let session = principal.require()?;
    session.authenticate(ActionType::CreateRecipes)?;

    let mut errors = FieldErrors::new();

    let ingredients = validate_ingredients(form.ingredients.as_deref(), &mut errors, pool).await?;
    let tags = validate_tags(form.tags.as_deref(), &mut errors, pool).await?;

    let cooking_time = positive_small_int(form.cooking_time.as_ref()).unwrap_or_else(|reason| {
        let message = if reason == REQUIRED {
            reason.to_string()
        } else {
            format!("Cooking time {reason}.")
        };
        errors.add("cooking_time", &message);
        0
    });

    let name = required_text(form.name.as_deref(), "name", &mut errors);
    if name.chars().count() > RECIPE_NAME_MAX_LENGTH {
        errors.add(
            "name",
            &format!("Ensure this field has no more than {RECIPE_NAME_MAX_LENGTH} characters."),
        );
    }
    let text = required_text(form.text.as_deref(), "text", &mut errors);

    let image = match (form.image.as_deref().map(str::trim), mode) {
        (None | Some(""), FormMode::Create) => {
            errors.add("image", REQUIRED);
            None
        }
        (None | Some(""), FormMode::Update) => None,
        (Some(data), _) => match ImageUpload::decode(data) {
            Ok(image) => Some(image),
            Err(ApiError::Validation(image_errors)) => {
                for message in image_errors.get("image").into_iter().flatten() {
                    errors.add("image", message);
                }
                None
            }
            Err(e) => return Err(e),
        },
    };

    errors.into_result()?;

    Ok(ValidatedRecipe {
        name,
        text,
        cooking_time,
        image,
        tags,
        ingredients,
    })
}

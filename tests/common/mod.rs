//! Shared setup: a fresh store in a temporary directory, three users, a few
//! tags and ingredients.

#![allow(dead_code)]

use foodgram_sdk::{
    actions::{
        ingredients::{import_ingredients, list_ingredients},
        tags::create_tag,
        users::{register_user, set_superuser, RegisterForm},
    },
    connect::connect,
    form::RecipeForm,
    jwt::{Principal, SessionKey},
    media::MediaStore,
    schema::{Ingredient, NewIngredient, Tag, User, UserRole},
};
use serde_json::{json, Value};
use sqlx::{Pool, Sqlite};
use tempfile::TempDir;

/// 1x1 transparent png.
pub const PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub struct TestEnv {
    // keeps the store and media alive for the duration of the test
    pub dir: TempDir,
    pub pool: Pool<Sqlite>,
    pub media: MediaStore,
    pub key: SessionKey,
    pub alice: User,
    pub bob: User,
    pub admin: User,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<Ingredient>,
}

impl TestEnv {
    pub fn principal(user: &User) -> Principal {
        Principal::from(user.clone())
    }

    pub fn alice(&self) -> Principal {
        Self::principal(&self.alice)
    }

    pub fn bob(&self) -> Principal {
        Self::principal(&self.bob)
    }

    pub fn admin(&self) -> Principal {
        Self::principal(&self.admin)
    }

    pub fn ingredient(&self, name: &str) -> &Ingredient {
        self.ingredients
            .iter()
            .find(|i| i.name == name)
            .expect("seeded ingredient")
    }
}

async fn user(pool: &Pool<Sqlite>, name: &str, role: UserRole) -> User {
    register_user(
        RegisterForm {
            email: Some(format!("{name}@example.com")),
            username: Some(name.to_string()),
            first_name: Some(name.to_string()),
            last_name: Some(String::from("Cook")),
            password: Some(format!("{name}-password")),
        },
        role,
        pool,
    )
    .await
    .expect("register user")
}

pub async fn setup() -> TestEnv {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("test.sqlite").display());
    let pool = connect(&url).await.expect("connect to store");
    let media = MediaStore::new(dir.path().join("media"), "/media/");
    let key = SessionKey::new(b"test-secret", 1).expect("session key");

    let alice = user(&pool, "alice", UserRole::User).await;
    let bob = user(&pool, "bob", UserRole::User).await;
    let admin = user(&pool, "boss", UserRole::User).await;
    set_superuser(admin.id, &pool).await.expect("promote admin");
    let admin = foodgram_sdk::actions::users::get_user(admin.id, &pool)
        .await
        .expect("load admin")
        .expect("admin exists");

    let mut tags = vec![];
    for (name, slug, color) in [
        ("Breakfast", "breakfast", "#E26C2D"),
        ("Lunch", "lunch", "#49B64E"),
        ("Dinner", "dinner", "#8775D2"),
    ] {
        tags.push(
            create_tag(name, slug, Some(color), &pool)
                .await
                .expect("create tag"),
        );
    }

    let seed: Vec<NewIngredient> = [
        ("flour", "g"),
        ("milk", "ml"),
        ("egg", "pcs"),
        ("sugar", "g"),
    ]
    .into_iter()
    .map(|(name, unit)| NewIngredient {
        name: name.to_string(),
        measurement_unit: unit.to_string(),
    })
    .collect();
    import_ingredients(&seed, &pool)
        .await
        .expect("import ingredients");
    let ingredients = list_ingredients(None, &pool)
        .await
        .expect("list ingredients");

    TestEnv {
        dir,
        pool,
        media,
        key,
        alice,
        bob,
        admin,
        tags,
        ingredients,
    }
}

/// A complete payload; tests override the fields they exercise.
pub fn recipe_payload(name: &str, tags: &[i64], ingredients: &[(i64, i64)]) -> Value {
    json!({
        "ingredients": ingredients
            .iter()
            .map(|(id, amount)| json!({ "id": id, "amount": amount }))
            .collect::<Vec<_>>(),
        "tags": tags,
        "image": PNG,
        "name": name,
        "text": "Mix and bake.",
        "cooking_time": 20,
    })
}

pub fn recipe_form(payload: Value) -> RecipeForm {
    serde_json::from_value(payload).expect("recipe form")
}

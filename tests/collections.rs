//! Favorites, shopping list and subscriptions.

mod common;

#[cfg(test)]
mod tests {
    use foodgram_sdk::{
        actions::{
            memberships::{
                add_membership, is_member, list_member_recipes, list_subscribed_authors,
                remove_membership, Collection,
            },
            recipes::{create_recipe, delete_recipe},
            shopping_list::{collect_shopping_list, download_shopping_list},
        },
        error::ApiError,
        form::{validate_recipe_form, FormMode},
        jwt::Principal,
        pagination::PageParams,
        schema::Recipe,
        views::SubscriptionView,
    };

    use crate::common::{recipe_form, recipe_payload, setup, TestEnv};

    async fn create(
        env: &TestEnv,
        principal: &Principal,
        name: &str,
        ingredients: &[(i64, i64)],
    ) -> Recipe {
        let payload = recipe_payload(name, &[env.tags[0].id], ingredients);
        let validated =
            validate_recipe_form(recipe_form(payload), principal, FormMode::Create, &env.pool)
                .await
                .unwrap();
        create_recipe(validated, principal, &env.media, &env.pool)
            .await
            .unwrap()
    }

    async fn rows(env: &TestEnv, table: &str) -> i64 {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&env.pool)
            .await
            .unwrap();
        count.0
    }

    #[tokio::test]
    async fn favorite_add_and_remove() {
        let env = setup().await;
        let flour = env.ingredient("flour").id;
        let recipe = create(&env, &env.alice(), "Pancakes", &[(flour, 3)]).await;
        let bob = env.bob();

        let entry = add_membership(Collection::Favorites, &bob, recipe.id, &env.pool)
            .await
            .unwrap();
        assert_eq!(entry.user_id, env.bob.id);
        assert_eq!(entry.target_id, recipe.id);
        assert!(
            is_member(Collection::Favorites, Some(env.bob.id), recipe.id, &env.pool)
                .await
                .unwrap()
        );

        let err = add_membership(Collection::Favorites, &bob, recipe.id, &env.pool)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(rows(&env, "favorites").await, 1);

        remove_membership(Collection::Favorites, &bob, recipe.id, &env.pool)
            .await
            .unwrap();
        let err = remove_membership(Collection::Favorites, &bob, recipe.id, &env.pool)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(rows(&env, "favorites").await, 0);
    }

    #[tokio::test]
    async fn missing_targets_and_anonymous_callers() {
        let env = setup().await;

        let err = add_membership(Collection::Favorites, &env.bob(), 4242, &env.pool)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = add_membership(Collection::Subscriptions, &env.bob(), 4242, &env.pool)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = add_membership(
            Collection::ShoppingList,
            &Principal::Anonymous,
            1,
            &env.pool,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));

        assert!(!is_member(Collection::Favorites, None, 1, &env.pool)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn concurrent_adds_leave_one_entry() {
        let env = setup().await;
        let flour = env.ingredient("flour").id;
        let recipe = create(&env, &env.alice(), "Pancakes", &[(flour, 3)]).await;
        let bob = env.bob();

        let (a, b) = tokio::join!(
            add_membership(Collection::ShoppingList, &bob, recipe.id, &env.pool),
            add_membership(Collection::ShoppingList, &bob, recipe.id, &env.pool),
        );

        assert!(a.is_ok() != b.is_ok());
        assert_eq!(rows(&env, "shopping_list").await, 1);
    }

    #[tokio::test]
    async fn self_subscription_is_rejected() {
        let env = setup().await;

        let err = add_membership(
            Collection::Subscriptions,
            &env.alice(),
            env.alice.id,
            &env.pool,
        )
        .await
        .unwrap_err();

        match err {
            ApiError::Conflict(message) => assert_eq!(message, "You cannot subscribe to yourself."),
            other => panic!("expected a conflict, got {other:?}"),
        }
        assert_eq!(rows(&env, "subscriptions").await, 0);
    }

    #[tokio::test]
    async fn subscriptions_honour_recipes_limit() {
        let env = setup().await;
        let flour = env.ingredient("flour").id;
        let alice = env.alice();

        let mut created = vec![];
        for name in ["Pancakes", "Bread", "Cake"] {
            created.push(create(&env, &alice, name, &[(flour, 100)]).await);
        }

        add_membership(Collection::Subscriptions, &env.bob(), env.alice.id, &env.pool)
            .await
            .unwrap();
        let err = add_membership(Collection::Subscriptions, &env.bob(), env.alice.id, &env.pool)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let page = list_subscribed_authors(&env.bob(), &PageParams::default(), &env.pool)
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].id, env.alice.id);

        let view = SubscriptionView::build(&page.results[0], Some(2), &env.media, &env.pool)
            .await
            .unwrap();
        assert!(view.author.is_subscribed);
        assert_eq!(view.recipes.len(), 2);
        assert_eq!(view.recipes_count, 3);
        // newest first
        assert_eq!(view.recipes[0].id, created[2].id);

        let unlimited = SubscriptionView::build(&page.results[0], None, &env.media, &env.pool)
            .await
            .unwrap();
        assert_eq!(unlimited.recipes.len(), 3);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["recipes_count"], 3);
    }

    #[tokio::test]
    async fn shopping_list_sums_amounts() {
        let env = setup().await;
        let flour = env.ingredient("flour").id;
        let milk = env.ingredient("milk").id;
        let bob = env.bob();

        let pancakes = create(&env, &env.alice(), "Pancakes", &[(flour, 200), (milk, 250)]).await;
        let bread = create(&env, &env.alice(), "Bread", &[(flour, 500)]).await;

        for recipe in [&pancakes, &bread] {
            add_membership(Collection::ShoppingList, &bob, recipe.id, &env.pool)
                .await
                .unwrap();
        }

        let items = collect_shopping_list(&bob, &env.pool).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "flour");
        assert_eq!(items[0].total_amount, 700);
        assert_eq!(items[1].name, "milk");
        assert_eq!(items[1].total_amount, 250);

        let text = download_shopping_list(&bob, &env.pool).await.unwrap();
        assert!(text.contains("flour (g) - 700"));
        assert!(text.contains("milk (ml) - 250"));

        let listed = list_member_recipes(
            Collection::ShoppingList,
            &bob,
            &PageParams::default(),
            &env.pool,
        )
        .await
        .unwrap();
        assert_eq!(listed.count, 2);
    }

    #[tokio::test]
    async fn deleting_a_recipe_cascades() {
        let env = setup().await;
        let flour = env.ingredient("flour").id;
        let alice = env.alice();
        let bob = env.bob();

        let recipe = create(&env, &alice, "Pancakes", &[(flour, 3)]).await;
        add_membership(Collection::Favorites, &bob, recipe.id, &env.pool)
            .await
            .unwrap();
        add_membership(Collection::ShoppingList, &bob, recipe.id, &env.pool)
            .await
            .unwrap();

        delete_recipe(recipe.id, &alice, &env.media, &env.pool)
            .await
            .unwrap();

        for table in [
            "favorites",
            "shopping_list",
            "recipe_tags",
            "recipe_ingredients",
        ] {
            assert_eq!(rows(&env, table).await, 0, "{table} should be empty");
        }
        assert!(collect_shopping_list(&bob, &env.pool)
            .await
            .unwrap()
            .is_empty());
    }
}

//! Single item operations through the HTTP transport.

#[cfg(test)]
mod tests {
    use dynaflow_core::DynaflowError;
    use dynaflow_core::expression::condition::{attribute_not_exists, eq};
    use dynaflow_core::expression::update::{append, increment, remove, set};
    use dynaflow_core::operation::{DeleteOptions, GetOptions, PutOptions, UpdateOptions};
    use dynaflow_model::types::ReturnValue;
    use dynaflow_model::{AttributeValue, Item, Key};

    use crate::{admin_client, cleanup_table, create_table, dynaflow};

    fn key(id: &str) -> Key {
        [("pk".to_owned(), AttributeValue::from(id))]
            .into_iter()
            .collect()
    }

    fn user(id: &str, name: &str) -> Item {
        let mut item = key(id);
        item.insert("name".to_owned(), AttributeValue::from(name));
        item
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_put_get_and_delete_item() {
        let admin = admin_client();
        let table = create_table(&admin, "item", false)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        let written = client
            .put(user("u1", "Ada"), PutOptions::default())
            .await
            .expect("put");
        assert_eq!(written, user("u1", "Ada"));

        let found = client
            .get(key("u1"), GetOptions::default().select(["name"]))
            .await
            .expect("get")
            .expect("item exists");
        assert_eq!(found.get("name").and_then(AttributeValue::as_s), Some("Ada"));
        assert!(!found.contains_key("pk"));

        let old = client
            .delete(key("u1"), DeleteOptions::default().return_values(ReturnValue::AllOld))
            .await
            .expect("delete");
        assert_eq!(old, user("u1", "Ada"));
        assert!(client.get(key("u1"), GetOptions::default()).await.expect("get").is_none());

        cleanup_table(&admin, &table).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_fail_conditional_put_without_retrying() {
        let admin = admin_client();
        let table = create_table(&admin, "conditional", false)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        let guarded = || PutOptions::default().when(attribute_not_exists("pk"));
        client
            .put(user("u1", "Ada"), guarded())
            .await
            .expect("first put");
        let err = client
            .put(user("u1", "Grace"), guarded())
            .await
            .expect_err("item already exists");
        assert!(matches!(err, DynaflowError::Fatal(_)));
        assert!(!err.is_retryable());

        cleanup_table(&admin, &table).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_apply_compiled_update() {
        let admin = admin_client();
        let table = create_table(&admin, "update", false)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        client
            .put(user("u1", "Ada"), PutOptions::default())
            .await
            .expect("put");
        let updated = client
            .update(
                key("u1"),
                UpdateOptions::default()
                    .apply(increment("visits", 2_i32))
                    .apply(append("tags", ["a", "b"]))
                    .apply(set("name", "Ada L."))
                    .apply(remove("missing"))
                    .when(eq("name", "Ada"))
                    .return_values(ReturnValue::AllNew),
            )
            .await
            .expect("update");

        assert_eq!(updated.get("visits").and_then(AttributeValue::as_n), Some("2"));
        assert_eq!(updated.get("tags").and_then(AttributeValue::as_l).map(<[_]>::len), Some(2));
        assert_eq!(updated.get("name").and_then(AttributeValue::as_s), Some("Ada L."));

        cleanup_table(&admin, &table).await;
    }
}

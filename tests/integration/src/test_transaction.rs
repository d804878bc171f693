//! Transactions through the HTTP transport.

#[cfg(test)]
mod tests {
    use dynaflow_core::DynaflowError;
    use dynaflow_core::client::TransactWriteOptions;
    use dynaflow_core::expression::condition::attribute_exists;
    use dynaflow_core::expression::update::{decrement, increment};
    use dynaflow_core::operation::{GetOptions, PutOptions, UpdateOptions};
    use dynaflow_core::transaction::{TransactAction, TransactRead};
    use dynaflow_model::{AttributeValue, Item, Key};

    use crate::{admin_client, cleanup_table, create_table, dynaflow};

    fn key(id: &str) -> Key {
        [("pk".to_owned(), AttributeValue::from(id))]
            .into_iter()
            .collect()
    }

    fn account(id: &str, balance: i64) -> Item {
        let mut item = key(id);
        item.insert("balance".to_owned(), AttributeValue::from(balance));
        item
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_transfer_atomically() {
        let admin = admin_client();
        let table = create_table(&admin, "transact", false)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        for item in [account("a", 100), account("b", 0)] {
            client.put(item, PutOptions::default()).await.expect("seed");
        }

        let transfer = vec![
            TransactAction::update(
                &table,
                key("a"),
                UpdateOptions::default().apply(decrement("balance", 30_i64)),
            )
            .expect("debit"),
            TransactAction::update(
                &table,
                key("b"),
                UpdateOptions::default().apply(increment("balance", 30_i64)),
            )
            .expect("credit"),
        ];
        client
            .transact_write(transfer, TransactWriteOptions::default())
            .await
            .expect("transfer");

        let reads = vec![
            TransactRead::get(&table, key("a"), GetOptions::default()).expect("read a"),
            TransactRead::get(&table, key("b"), GetOptions::default()).expect("read b"),
            TransactRead::get(&table, key("c"), GetOptions::default()).expect("read c"),
        ];
        let balances = client.transact_get(reads).await.expect("transact get");
        let balance = |i: usize| {
            balances[i]
                .as_ref()
                .and_then(|item| item.get("balance"))
                .and_then(AttributeValue::as_n)
                .map(ToOwned::to_owned)
        };
        assert_eq!(balance(0).as_deref(), Some("70"));
        assert_eq!(balance(1).as_deref(), Some("30"));
        assert!(balances[2].is_none());

        cleanup_table(&admin, &table).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_cancel_transaction_on_failed_check() {
        let admin = admin_client();
        let table = create_table(&admin, "cancel", false)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        let actions = vec![
            TransactAction::check(&table, key("ghost"), attribute_exists("pk")).expect("check"),
            TransactAction::put(
                &table,
                account("a", 1),
                PutOptions::default(),
            )
            .expect("put"),
        ];
        let err = client
            .transact_write(actions, TransactWriteOptions::default())
            .await
            .expect_err("check fails");
        assert!(matches!(err, DynaflowError::Fatal(_)));
        assert!(
            client
                .get(key("a"), GetOptions::default())
                .await
                .expect("get")
                .is_none()
        );

        cleanup_table(&admin, &table).await;
    }
}

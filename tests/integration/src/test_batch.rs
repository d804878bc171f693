//! Batch fan-out through the HTTP transport.

#[cfg(test)]
mod tests {
    use dynaflow_core::operation::{BatchGetOptions, BatchWriteOptions};
    use dynaflow_model::{AttributeValue, Key};

    use crate::{admin_client, cleanup_table, create_table, dynaflow};

    fn keys(n: usize) -> Vec<Key> {
        (0..n)
            .map(|i| {
                [("pk".to_owned(), AttributeValue::from(format!("k{i}")))]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_write_and_read_more_than_one_chunk() {
        let admin = admin_client();
        let table = create_table(&admin, "batch", false)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        client
            .batch_put(keys(130), BatchWriteOptions::default())
            .await
            .expect("batch put");

        let items = client
            .batch_get(keys(130), BatchGetOptions::default().consistent_read(true))
            .await
            .expect("batch get");
        assert_eq!(items.len(), 130);

        client
            .batch_delete(keys(130), BatchWriteOptions::default())
            .await
            .expect("batch delete");
        let items = client
            .batch_get(keys(130), BatchGetOptions::default().consistent_read(true))
            .await
            .expect("batch get");
        assert!(items.is_empty());

        cleanup_table(&admin, &table).await;
    }
}

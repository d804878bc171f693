//! Query, scan and table listing through the HTTP transport.

#[cfg(test)]
mod tests {
    use dynaflow_core::expression::condition::{begins_with, ge};
    use dynaflow_core::operation::{
        BatchWriteOptions, ListTablesOptions, QueryOptions, ScanOptions, SortOrder,
    };
    use dynaflow_model::{AttributeValue, Item, Key};

    use crate::{admin_client, cleanup_table, create_table, dynaflow};

    fn order(customer: &str, n: usize) -> Item {
        [
            ("pk".to_owned(), AttributeValue::from(customer)),
            ("sk".to_owned(), AttributeValue::from(format!("order#{n:03}"))),
            ("total".to_owned(), AttributeValue::from(n)),
        ]
        .into_iter()
        .collect()
    }

    fn partition(customer: &str) -> Key {
        [("pk".to_owned(), AttributeValue::from(customer))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_query_with_sort_and_filter() {
        let admin = admin_client();
        let table = create_table(&admin, "query", true)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        let items = (0..40).map(|n| order("c1", n)).collect();
        client
            .batch_put(items, BatchWriteOptions::default())
            .await
            .expect("seed");

        let items = client
            .query(
                &partition("c1"),
                QueryOptions::default()
                    .having(begins_with("sk", "order#0"))
                    .filter(ge("total", 30_i32))
                    .sort(SortOrder::Descending),
            )
            .await
            .expect("query");
        assert_eq!(items.len(), 10);
        assert_eq!(
            items[0].get("sk").and_then(AttributeValue::as_s),
            Some("order#039")
        );

        let page = client
            .query_raw(&partition("c1"), QueryOptions::default().limit(5).single_page())
            .await
            .expect("single page");
        assert_eq!(page.items.len(), 5);
        assert!(page.cursor.is_some());

        cleanup_table(&admin, &table).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_scan_in_segments_and_truncate() {
        let admin = admin_client();
        let table = create_table(&admin, "scan", true)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        let items = (0..60).map(|n| order(&format!("c{}", n % 7), n)).collect();
        client
            .batch_put(items, BatchWriteOptions::default())
            .await
            .expect("seed");

        let all = client.scan(ScanOptions::default()).await.expect("scan");
        assert_eq!(all.len(), 60);

        let limited = client
            .scan(ScanOptions::default().limit(12))
            .await
            .expect("limited scan");
        assert_eq!(limited.len(), 12);

        let sequential = client
            .scan(ScanOptions::default().disable_segments())
            .await
            .expect("sequential scan");
        assert_eq!(sequential.len(), 60);

        cleanup_table(&admin, &table).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_list_created_table() {
        let admin = admin_client();
        let table = create_table(&admin, "list", false)
            .await
            .expect("create table");
        let client = dynaflow(&table).expect("client");

        let names = client
            .list_tables(ListTablesOptions::default())
            .await
            .expect("list tables");
        assert!(names.contains(&table));

        cleanup_table(&admin, &table).await;
    }
}

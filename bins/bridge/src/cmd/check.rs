use std::time::Duration;

use storage_mongo::{MongoStore, to_display_json};

use crate::config::Effective;
use crate::error::BridgeError;

use super::close_store;

/// Проверка MongoDB: ping, список баз и коллекций, последние документы
/// коллекции по умолчанию.
pub async fn run(eff: &Effective, limit: i64) -> Result<(), BridgeError> {
    let uri = eff.mongo_uri()?;
    let store = MongoStore::connect(uri, Some(Duration::from_secs(5))).await?;
    println!("MongoDB connection OK");

    let result = report(&store, eff, limit).await;
    close_store(&store).await;
    result
}

async fn report(store: &MongoStore, eff: &Effective, limit: i64) -> Result<(), BridgeError> {
    let dest = eff.bridge.defaults();

    let databases = store.list_databases().await?;
    println!("Databases: {}", databases.join(", "));

    let collections = store.list_collections(&dest.database).await?;
    println!("Collections in '{}': {}", dest.database, collections.join(", "));

    if !collections.iter().any(|c| *c == dest.collection) {
        println!("Collection '{}' not found in '{}'", dest.collection, dest.database);
        return Ok(());
    }

    let docs = store.latest(&dest, limit).await?;
    println!("Newest documents in {dest} (up to {limit}):");
    for doc in docs {
        println!("{}", to_display_json(doc));
    }
    Ok(())
}

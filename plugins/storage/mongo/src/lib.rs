use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::TryStreamExt;
use mongodb::Client;
use mongodb::bson::{self, Bson, Document as BsonDocument, doc};
use mongodb::options::ClientOptions;
use serde_json::{Number, Value};

use bridge_api::{Destination, Document, DocumentStore, PluginError, RECEIVED_AT_FIELD};

const APP_NAME: &str = "mqtt-mongo-bridge";

/// Convert a JSON document into BSON for `insert_one`.
///
/// BSON has no unsigned integers: values above `i64::MAX` are stored as
/// doubles.
pub fn to_bson(mut document: Document) -> Result<BsonDocument, PluginError> {
    document.values_mut().for_each(widen_unsigned);
    bson::to_document(&document).map_err(|e| PluginError::format_err(format!("bson encode: {e}")))
}

fn widen_unsigned(value: &mut Value) {
    match value {
        Value::Number(n) if n.as_i64().is_none() => {
            if let Some(wide) = n.as_u64().and_then(|u| Number::from_f64(u as f64)) {
                *n = wide;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(widen_unsigned),
        Value::Object(map) => map.values_mut().for_each(widen_unsigned),
        _ => {}
    }
}

/// Render a stored document as relaxed extended JSON, `_id` as a hex string.
pub fn to_display_json(mut document: BsonDocument) -> serde_json::Value {
    if let Some(Bson::ObjectId(id)) = document.get("_id") {
        let hex = id.to_hex();
        document.insert("_id", hex);
    }
    Bson::Document(document).into_relaxed_extjson()
}

// ═══════════════════════════════════════════════════════════════
//  MongoStore
// ═══════════════════════════════════════════════════════════════

/// MongoDB DocumentStore.
///
/// Один `Client` (внутри — пул соединений) на весь процесс; база и
/// коллекция выбираются на каждую вставку.
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Connect and ping `admin`. Fails if the server cannot be reached
    /// within the selection timeout (driver default when `None`).
    pub async fn connect(uri: &str, selection_timeout: Option<Duration>) -> Result<Self, PluginError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| PluginError::config(format!("mongo uri: {e}")))?;
        if options.app_name.is_none() {
            options.app_name = Some(APP_NAME.to_string());
        }
        if selection_timeout.is_some() {
            options.server_selection_timeout = selection_timeout;
        }
        let client = Client::with_options(options)
            .map_err(|e| PluginError::config(format!("mongo client: {e}")))?;

        let store = Self { client };
        store.ping().await?;
        Ok(store)
    }

    pub async fn ping(&self) -> Result<(), PluginError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| PluginError::io(format!("mongo ping: {e}")))?;
        Ok(())
    }

    pub async fn list_databases(&self) -> Result<Vec<String>, PluginError> {
        self.client
            .list_database_names()
            .await
            .map_err(|e| PluginError::io(format!("list databases: {e}")))
    }

    pub async fn list_collections(&self, database: &str) -> Result<Vec<String>, PluginError> {
        self.client
            .database(database)
            .list_collection_names()
            .await
            .map_err(|e| PluginError::io(format!("list collections ({database}): {e}")))
    }

    /// Newest `limit` documents of `destination` by `_received_at`.
    pub async fn latest(
        &self,
        destination: &Destination,
        limit: i64,
    ) -> Result<Vec<BsonDocument>, PluginError> {
        let mut sort = BsonDocument::new();
        sort.insert(RECEIVED_AT_FIELD, -1);

        let cursor = self
            .client
            .database(&destination.database)
            .collection::<BsonDocument>(&destination.collection)
            .find(doc! {})
            .sort(sort)
            .limit(limit)
            .await
            .map_err(|e| PluginError::io(format!("find ({destination}): {e}")))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| PluginError::io(format!("cursor ({destination}): {e}")))
    }
}

impl DocumentStore for MongoStore {
    fn insert(
        &self,
        destination: &Destination,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        let destination = destination.clone();
        Box::pin(async move {
            let doc = to_bson(document)?;
            self.client
                .database(&destination.database)
                .collection::<BsonDocument>(&destination.collection)
                .insert_one(doc)
                .await
                .map_err(|e| PluginError::io(format!("insert_one ({destination}): {e}")))?;
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.client.clone().shutdown().immediate(true).await;
            tracing::info!("mongo client closed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use serde_json::json;

    fn obj(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn json_document_converts_to_bson() {
        let d = obj(json!({
            "state": "open",
            "count": 3,
            "temp": 21.5,
            "tags": ["a", "b"],
            "nested": {"ok": true, "none": null},
            "_received_at": "2026-10-18T09:15:02.123Z"
        }));
        let b = to_bson(d).unwrap();
        assert_eq!(b.get_str("state").unwrap(), "open");
        assert_eq!(b.get_f64("temp").unwrap(), 21.5);
        assert_eq!(b.get_array("tags").unwrap().len(), 2);
        assert!(b.get_document("nested").unwrap().get_bool("ok").unwrap());
        assert_eq!(b.get_str("_received_at").unwrap(), "2026-10-18T09:15:02.123Z");
        assert!(matches!(b.get("count"), Some(Bson::Int32(3)) | Some(Bson::Int64(3))));
    }

    #[test]
    fn integers_above_i64_become_doubles() {
        let d = obj(json!({
            "device_id": u64::MAX,
            "state": "on",
            "readings": [1, u64::MAX],
            "meta": { "serial": 9_223_372_036_854_775_808u64 }
        }));
        let b = to_bson(d).unwrap();
        assert_eq!(b.get_f64("device_id").unwrap(), u64::MAX as f64);
        assert_eq!(b.get_str("state").unwrap(), "on");

        let readings = b.get_array("readings").unwrap();
        assert!(matches!(readings[0], Bson::Int32(1) | Bson::Int64(1)));
        assert_eq!(readings[1], Bson::Double(u64::MAX as f64));

        let serial = b.get_document("meta").unwrap().get_f64("serial").unwrap();
        assert_eq!(serial, 9_223_372_036_854_775_808u64 as f64);
    }

    #[test]
    fn parsed_payload_with_huge_integer_is_storable() {
        let record = bridge_api::Record::from_payload(
            br#"{"device_id": 18446744073709551615, "state": "on"}"#,
        );
        assert!(!record.is_raw());
        assert!(to_bson(record.into_document()).is_ok());
    }

    #[test]
    fn display_json_stringifies_object_id() {
        let id = ObjectId::new();
        let d = doc! { "_id": id, "raw_payload": "on" };
        let v = to_display_json(d);
        assert_eq!(v, json!({ "_id": id.to_hex(), "raw_payload": "on" }));
    }
}

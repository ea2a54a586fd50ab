//! Purpose: Build immutable command envelopes for the Quiver Data API.
//! Exports: `Command`, `CommandTarget`.
//! Role: Pure construction layer; turns validated operation inputs into wire objects.
//! Invariants: One `Command` maps to exactly one wire call and never mutates after build.
//! Invariants: Payloads omit absent fields; the service treats missing keys as defaults.
use serde_json::{Map, Value};

/// Addressing for a command: a keyspace, optionally narrowed to one collection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandTarget {
    keyspace: String,
    collection: Option<String>,
}

impl CommandTarget {
    pub fn keyspace(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            collection: None,
        }
    }

    pub fn collection(keyspace: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            collection: Some(collection.into()),
        }
    }

    pub fn keyspace_name(&self) -> &str {
        &self.keyspace
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// URL path segments below the API root, in order.
    pub fn path_segments(&self) -> Vec<&str> {
        let mut segments = vec!["v1", self.keyspace.as_str()];
        if let Some(collection) = &self.collection {
            segments.push(collection.as_str());
        }
        segments
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    target: CommandTarget,
    name: &'static str,
    payload: Map<String, Value>,
}

impl Command {
    fn new(target: CommandTarget, name: &'static str, payload: Map<String, Value>) -> Self {
        Self {
            target,
            name,
            payload,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn target(&self) -> &CommandTarget {
        &self.target
    }

    /// The full wire body: `{"<commandName>": {payload}}`.
    pub fn body(&self) -> Value {
        let mut envelope = Map::new();
        envelope.insert(self.name.to_string(), Value::Object(self.payload.clone()));
        Value::Object(envelope)
    }

    pub fn insert_one(target: CommandTarget, document: Value) -> Self {
        let mut payload = Map::new();
        payload.insert("document".to_string(), document);
        Self::new(target, "insertOne", payload)
    }

    pub fn insert_many(target: CommandTarget, documents: Vec<Value>, ordered: bool) -> Self {
        let mut payload = Map::new();
        payload.insert("documents".to_string(), Value::Array(documents));
        let mut options = Map::new();
        options.insert("ordered".to_string(), Value::Bool(ordered));
        payload.insert("options".to_string(), Value::Object(options));
        Self::new(target, "insertMany", payload)
    }

    pub fn find(
        target: CommandTarget,
        filter: Option<Value>,
        sort: Option<Value>,
        projection: Option<Value>,
        options: Map<String, Value>,
    ) -> Self {
        let mut payload = Map::new();
        if let Some(filter) = filter {
            payload.insert("filter".to_string(), filter);
        }
        if let Some(sort) = sort {
            payload.insert("sort".to_string(), sort);
        }
        if let Some(projection) = projection {
            payload.insert("projection".to_string(), projection);
        }
        if !options.is_empty() {
            payload.insert("options".to_string(), Value::Object(options));
        }
        Self::new(target, "find", payload)
    }

    pub fn find_one(
        target: CommandTarget,
        filter: Option<Value>,
        sort: Option<Value>,
        projection: Option<Value>,
        options: Map<String, Value>,
    ) -> Self {
        let mut payload = Map::new();
        if let Some(filter) = filter {
            payload.insert("filter".to_string(), filter);
        }
        if let Some(sort) = sort {
            payload.insert("sort".to_string(), sort);
        }
        if let Some(projection) = projection {
            payload.insert("projection".to_string(), projection);
        }
        if !options.is_empty() {
            payload.insert("options".to_string(), Value::Object(options));
        }
        Self::new(target, "findOne", payload)
    }

    pub fn update_one(target: CommandTarget, filter: Value, update: Value, upsert: bool) -> Self {
        Self::new(target, "updateOne", update_payload(filter, update, upsert))
    }

    pub fn update_many(target: CommandTarget, filter: Value, update: Value, upsert: bool) -> Self {
        Self::new(target, "updateMany", update_payload(filter, update, upsert))
    }

    pub fn delete_one(target: CommandTarget, filter: Value) -> Self {
        let mut payload = Map::new();
        payload.insert("filter".to_string(), filter);
        Self::new(target, "deleteOne", payload)
    }

    pub fn delete_many(target: CommandTarget, filter: Value) -> Self {
        let mut payload = Map::new();
        payload.insert("filter".to_string(), filter);
        Self::new(target, "deleteMany", payload)
    }

    pub fn count_documents(target: CommandTarget, filter: Option<Value>) -> Self {
        let mut payload = Map::new();
        if let Some(filter) = filter {
            payload.insert("filter".to_string(), filter);
        }
        Self::new(target, "countDocuments", payload)
    }

    pub fn create_collection(
        target: CommandTarget,
        name: impl Into<String>,
        options: Map<String, Value>,
    ) -> Self {
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String(name.into()));
        if !options.is_empty() {
            payload.insert("options".to_string(), Value::Object(options));
        }
        Self::new(target, "createCollection", payload)
    }

    pub fn delete_collection(target: CommandTarget, name: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String(name.into()));
        Self::new(target, "deleteCollection", payload)
    }

    pub fn find_collections(target: CommandTarget) -> Self {
        Self::new(target, "findCollections", Map::new())
    }
}

/// One sub-operation of a bulk write. Each model maps to exactly one command;
/// results are keyed back to the model's position in the caller's list.
#[derive(Clone, Debug)]
pub enum WriteModel {
    InsertOne {
        document: Value,
    },
    UpdateOne {
        filter: Value,
        update: Value,
        upsert: bool,
    },
    UpdateMany {
        filter: Value,
        update: Value,
        upsert: bool,
    },
    DeleteOne {
        filter: Value,
    },
    DeleteMany {
        filter: Value,
    },
}

impl WriteModel {
    pub fn into_command(self, target: CommandTarget) -> Command {
        match self {
            WriteModel::InsertOne { document } => Command::insert_one(target, document),
            WriteModel::UpdateOne {
                filter,
                update,
                upsert,
            } => Command::update_one(target, filter, update, upsert),
            WriteModel::UpdateMany {
                filter,
                update,
                upsert,
            } => Command::update_many(target, filter, update, upsert),
            WriteModel::DeleteOne { filter } => Command::delete_one(target, filter),
            WriteModel::DeleteMany { filter } => Command::delete_many(target, filter),
        }
    }
}

fn update_payload(filter: Value, update: Value, upsert: bool) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("filter".to_string(), filter);
    payload.insert("update".to_string(), update);
    if upsert {
        let mut options = Map::new();
        options.insert("upsert".to_string(), Value::Bool(true));
        payload.insert("options".to_string(), Value::Object(options));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::{Command, CommandTarget};
    use serde_json::{json, Map, Value};

    fn target() -> CommandTarget {
        CommandTarget::collection("app", "events")
    }

    #[test]
    fn target_path_segments() {
        assert_eq!(
            CommandTarget::keyspace("app").path_segments(),
            vec!["v1", "app"]
        );
        assert_eq!(target().path_segments(), vec!["v1", "app", "events"]);
    }

    #[test]
    fn insert_many_envelope_shape() {
        let command = Command::insert_many(target(), vec![json!({"x": 1}), json!({"x": 2})], true);
        assert_eq!(command.name(), "insertMany");
        assert_eq!(
            command.body(),
            json!({
                "insertMany": {
                    "documents": [{"x": 1}, {"x": 2}],
                    "options": {"ordered": true}
                }
            })
        );
    }

    #[test]
    fn find_omits_absent_fields() {
        let command = Command::find(target(), None, None, None, Map::new());
        assert_eq!(command.body(), json!({"find": {}}));
    }

    #[test]
    fn find_carries_vector_sort_and_options() {
        let mut options = Map::new();
        options.insert("includeSimilarity".to_string(), Value::Bool(true));
        let command = Command::find(
            target(),
            Some(json!({"kind": "login"})),
            Some(json!({"$vector": [0.1, 0.2]})),
            None,
            options,
        );
        assert_eq!(
            command.body(),
            json!({
                "find": {
                    "filter": {"kind": "login"},
                    "sort": {"$vector": [0.1, 0.2]},
                    "options": {"includeSimilarity": true}
                }
            })
        );
    }

    #[test]
    fn update_one_upsert_sets_option() {
        let command = Command::update_one(
            target(),
            json!({"_id": "a"}),
            json!({"$set": {"seen": true}}),
            true,
        );
        assert_eq!(
            command.body(),
            json!({
                "updateOne": {
                    "filter": {"_id": "a"},
                    "update": {"$set": {"seen": true}},
                    "options": {"upsert": true}
                }
            })
        );
    }

    #[test]
    fn write_models_map_to_their_commands() {
        let insert = super::WriteModel::InsertOne {
            document: json!({"x": 1}),
        };
        assert_eq!(insert.into_command(target()).name(), "insertOne");

        let delete = super::WriteModel::DeleteMany {
            filter: json!({"stale": true}),
        };
        let command = delete.into_command(target());
        assert_eq!(command.name(), "deleteMany");
        assert_eq!(
            command.body(),
            json!({"deleteMany": {"filter": {"stale": true}}})
        );
    }

    #[test]
    fn create_collection_with_options() {
        let mut options = Map::new();
        options.insert("vector".to_string(), json!({"dimension": 3}));
        let command = Command::create_collection(CommandTarget::keyspace("app"), "events", options);
        assert_eq!(
            command.body(),
            json!({
                "createCollection": {
                    "name": "events",
                    "options": {"vector": {"dimension": 3}}
                }
            })
        );
    }
}

//! End-to-end tests: the reference backend driven through nimbus-client.
//!
//! Each test starts its own server on an ephemeral port.

use nimbus_client::{connect, ClientConfig};
use nimbus_engine::{codes, BatchOp, Error, Query, Record, Synchronizer, Value};
use nimbus_server::config::Config;
use nimbus_server::{app, AppState};
use serde_json::json;

/// Start a server in the background and return its API endpoint.
fn spawn_server(config: Config) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let endpoint = format!("http://{addr}{}", config.mount_path);

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app(AppState::new(config)))
                .await
                .unwrap();
        });
    });

    endpoint
}

fn setup() -> (String, Synchronizer) {
    let endpoint = spawn_server(Config::new("/1").unwrap());
    let sync = connect(&ClientConfig::new(endpoint.clone(), "test-app")).unwrap();
    (endpoint, sync)
}

#[cfg(test)]
mod object_tests {
    use super::*;

    #[test]
    fn test_save_fetch_update_delete() {
        let (_, sync) = setup();

        let mut score = Record::new("GameScore");
        score.put("player", "Sean Plott").unwrap();
        score.put("score", 1337i32).unwrap();
        score.save(&sync).unwrap();

        let id = score.object_id().unwrap().to_string();
        assert!(!score.is_dirty());
        assert!(score.created_at().is_some());
        assert_eq!(score.updated_at(), score.created_at());

        score.increment("score").unwrap();
        score.put("cheatMode", false).unwrap();
        score.save(&sync).unwrap();
        assert_eq!(score.get_i64("score"), Some(1338));

        let fetched = sync.get("GameScore", &id).unwrap();
        assert_eq!(fetched.get_str("player"), Some("Sean Plott"));
        assert_eq!(fetched.get_i64("score"), Some(1338));
        assert_eq!(fetched.get_bool("cheatMode"), Some(false));

        score.delete(&sync).unwrap();
        assert_eq!(score.object_id(), None);

        let err = sync.get("GameScore", &id).unwrap_err();
        assert_eq!(err.code(), codes::OBJECT_NOT_FOUND);
    }

    #[test]
    fn test_increments_from_two_clients_compose() {
        let (_, sync) = setup();

        let mut counter = Record::new("Counter");
        counter.put("n", 0i32).unwrap();
        counter.save(&sync).unwrap();
        let id = counter.object_id().unwrap().to_string();

        let mut other = sync.get("Counter", &id).unwrap();
        counter.increment_by("n", 5i32).unwrap();
        other.increment_by("n", 2i32).unwrap();
        counter.save(&sync).unwrap();
        other.save(&sync).unwrap();

        // The second save echoes the server's total, not the local guess.
        assert_eq!(other.get_i64("n"), Some(7));
        counter.fetch(&sync).unwrap();
        assert_eq!(counter.get_i64("n"), Some(7));
    }

    #[test]
    fn test_array_operations() {
        let (_, sync) = setup();

        let mut post = Record::new("Post");
        post.add_all_to_array("tags", [Value::from("a"), Value::from("b")]).unwrap();
        post.save(&sync).unwrap();

        post.add_unique_to_array("tags", "b").unwrap();
        post.add_unique_to_array("tags", "c").unwrap();
        post.save(&sync).unwrap();

        post.remove_from_array("tags", "a").unwrap();
        post.save(&sync).unwrap();

        let fetched = sync.get("Post", post.object_id().unwrap()).unwrap();
        assert_eq!(
            fetched.get_array("tags"),
            Some(&[Value::from("b"), Value::from("c")][..])
        );
    }

    #[test]
    fn test_pointers_and_user_endpoint() {
        let (_, sync) = setup();

        let mut user = sync.registry().create("_User");
        assert_eq!(user.endpoint(), "users");
        user.put("username", "ann").unwrap();
        user.save(&sync).unwrap();

        let mut post = Record::new("Post");
        post.put("author", &user).unwrap();
        post.save(&sync).unwrap();

        let fetched = sync.get("Post", post.object_id().unwrap()).unwrap();
        let author = fetched.get_object("author").unwrap();
        assert_eq!(author.class_name(), "_User");
        assert_eq!(author.object_id(), user.object_id());
        assert!(!author.is_data_available());

        let included = sync
            .first(&Query::new("Post").include("author"))
            .unwrap()
            .unwrap();
        assert_eq!(
            included.get_object("author").and_then(|a| a.get_str("username")),
            Some("ann")
        );
    }

    #[test]
    fn test_reserved_key_in_raw_body() {
        let (endpoint, _) = setup();

        let response = reqwest::blocking::Client::new()
            .post(format!("{endpoint}/classes/Post"))
            .json(&json!({"objectId": "mine"}))
            .send()
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["code"], json!(codes::INVALID_KEY_NAME));
        assert!(body["error"].is_string());
    }

    #[test]
    fn test_increment_of_string_is_rejected() {
        let (_, sync) = setup();

        let mut post = Record::new("Post");
        post.put("title", "hello").unwrap();
        post.save(&sync).unwrap();

        let mut stale = Record::without_data("Post", post.object_id().unwrap());
        stale.increment("title").unwrap();
        let err = stale.save(&sync).unwrap_err();
        assert_eq!(err.code(), codes::INCORRECT_TYPE);
        assert!(stale.is_dirty());
    }
}

#[cfg(test)]
mod query_tests {
    use super::*;

    fn seed(sync: &Synchronizer) {
        for (player, score) in [("a", 10i32), ("b", 50), ("c", 30), ("d", 70)] {
            let mut record = Record::new("GameScore");
            record.put("player", player).unwrap();
            record.put("score", score).unwrap();
            record.save(sync).unwrap();
        }
    }

    #[test]
    fn test_constraints_order_and_count() {
        let (_, sync) = setup();
        seed(&sync);

        let query = Query::new("GameScore")
            .where_greater_than("score", 20i32)
            .order_by_descending("score");
        let results = sync.find(&query).unwrap();
        let players: Vec<_> = results.iter().filter_map(|r| r.get_str("player")).collect();
        assert_eq!(players, vec!["d", "b", "c"]);

        assert_eq!(sync.count(&query).unwrap(), 3);

        let page = sync.find(&query.clone().skip(1).limit(1)).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get_str("player"), Some("b"));

        let picked = sync
            .find(&Query::new("GameScore").where_contained_in(
                "player",
                [Value::from("a"), Value::from("c")],
            ))
            .unwrap();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_select_keys() {
        let (_, sync) = setup();
        seed(&sync);

        let first = sync
            .first(&Query::new("GameScore").select_keys(["player"]).order_by_ascending("score"))
            .unwrap()
            .unwrap();
        assert_eq!(first.get_str("player"), Some("a"));
        assert!(!first.has("score"));
        assert!(first.object_id().is_some());
    }
}

#[cfg(test)]
mod relation_tests {
    use super::*;

    #[test]
    fn test_relation_add_remove_and_query() {
        let (_, sync) = setup();

        let tags: Vec<Record> = ["rust", "go", "zig"]
            .iter()
            .map(|label| {
                let mut tag = Record::new("Tag");
                tag.put("label", *label).unwrap();
                tag.save(&sync).unwrap();
                tag
            })
            .collect();

        let mut post = Record::new("Post");
        {
            let mut relation = post.relation("tags").unwrap();
            for tag in &tags {
                relation.add(tag).unwrap();
            }
        }
        post.save(&sync).unwrap();

        post.relation("tags").unwrap().remove(&tags[1]).unwrap();
        post.save(&sync).unwrap();

        let query = post.relation("tags").unwrap().query();
        assert_eq!(query.class_name(), "Tag");
        let mut labels: Vec<_> = sync
            .find(&query)
            .unwrap()
            .iter()
            .filter_map(|t| t.get_str("label").map(str::to_string))
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["rust", "zig"]);

        // A parent that was never fetched does not know the target class.
        let mut bare = Record::without_data("Post", post.object_id().unwrap());
        let query = bare.relation("tags").unwrap().query();
        assert_eq!(query.class_name(), "Post");
        let members = sync.find(&query).unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m.class_name() == "Tag"));
    }
}

#[cfg(test)]
mod batch_tests {
    use super::*;

    #[test]
    fn test_batch_partial_failure() {
        let (_, sync) = setup();

        let mut existing = Record::new("Post");
        existing.put("title", "old").unwrap();
        existing.save(&sync).unwrap();

        let mut created = Record::new("Post");
        created.put("title", "new").unwrap();
        existing.put("title", "updated").unwrap();
        let mut missing = Record::without_data("Post", "doesNotExist");
        missing.put("title", "ghost").unwrap();

        let mut batch = sync.batch();
        batch.add_object(&mut created, BatchOp::Create).unwrap();
        batch.add_object(&mut existing, BatchOp::Update).unwrap();
        batch.add_object(&mut missing, BatchOp::Update).unwrap();
        let all_ok = batch.execute(&sync).unwrap();
        let errors = batch.errors().unwrap();
        drop(batch);

        assert!(!all_ok);
        assert_eq!(errors.failure_count(), 1);
        assert_eq!(
            errors.get(&missing).map(Error::code),
            Some(codes::OBJECT_NOT_FOUND)
        );
        assert!(created.object_id().is_some());
        assert!(!created.is_dirty());
        assert!(!existing.is_dirty());
        assert!(missing.is_dirty());

        let fetched = sync.get("Post", existing.object_id().unwrap()).unwrap();
        assert_eq!(fetched.get_str("title"), Some("updated"));
    }

    #[test]
    fn test_batch_delete() {
        let (_, sync) = setup();

        let mut records: Vec<Record> = (0..3)
            .map(|i| {
                let mut record = Record::new("Item");
                record.put("i", i).unwrap();
                record.save(&sync).unwrap();
                record
            })
            .collect();

        let mut batch = sync.batch();
        batch.add_objects(records.iter_mut(), BatchOp::Delete).unwrap();
        assert!(batch.execute(&sync).unwrap());
        drop(batch);

        assert!(records.iter().all(|r| r.object_id().is_none()));
        assert_eq!(sync.count(&Query::new("Item")).unwrap(), 0);
    }

    #[test]
    fn test_batch_over_limit_is_rejected() {
        let (_, sync) = setup();

        let mut records: Vec<Record> = (0..51)
            .map(|i| {
                let mut record = Record::new("Item");
                record.put("i", i).unwrap();
                record
            })
            .collect();

        let mut batch = sync.batch();
        batch.add_objects(records.iter_mut(), BatchOp::Create).unwrap();
        let err = batch.execute(&sync).unwrap_err();
        drop(batch);

        assert_eq!(err.code(), codes::TOO_MANY_COMMANDS_IN_BATCH_REQUEST);
        assert!(records.iter().all(|r| r.is_dirty() && r.object_id().is_none()));
    }
}

#[cfg(test)]
mod auth_tests {
    use super::*;

    #[test]
    fn test_application_id_is_enforced() {
        let endpoint = spawn_server(Config::new("/1").unwrap().with_application_id("secret"));

        let wrong = connect(&ClientConfig::new(endpoint.clone(), "other")).unwrap();
        let mut record = Record::new("Post");
        record.put("x", 1i32).unwrap();
        let err = record.save(&wrong).unwrap_err();
        assert_eq!(err.code(), codes::OPERATION_FORBIDDEN);

        let right = connect(&ClientConfig::new(endpoint, "secret")).unwrap();
        record.save(&right).unwrap();
        assert!(record.object_id().is_some());
    }

    #[test]
    fn test_health_is_outside_mount() {
        let (endpoint, _) = setup();
        let root = endpoint.trim_end_matches("/1");

        let body: serde_json::Value = reqwest::blocking::get(format!("{root}/health"))
            .unwrap()
            .json()
            .unwrap();
        assert_eq!(body["status"], json!("ok"));
    }
}

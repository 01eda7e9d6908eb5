//! SCIM service behaviour over the default user and group mappings

use scim_bridge::config::AppConfig;
use scim_bridge::models::QueryParams;
use scim_bridge::AppError;
use serde_json::{json, Value};

mod common;

async fn create_user(test: &common::TestApp, user_name: &str, active: bool) -> String {
    create_user_in(test, "default", user_name, active).await
}

async fn create_user_in(test: &common::TestApp, context: &str, user_name: &str, active: bool) -> String {
    let user = test
        .app
        .users(context)
        .unwrap()
        .create(json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "userName": user_name,
            "name": {"givenName": "Test", "familyName": user_name},
            "active": active
        }))
        .await
        .unwrap();
    user["id"].as_str().unwrap().to_string()
}

fn member_ids(group: &Value) -> Vec<String> {
    group["members"]
        .as_array()
        .map(|members| {
            members
                .iter()
                .map(|m| m["value"].as_str().unwrap().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_create_and_get_user() {
    let test = common::setup_test_app().await;
    let id = create_user(&test, "ann", true).await;

    let row = test.row("fe_users", &id).await;
    assert_eq!(row["username"], json!("ann"));
    assert_eq!(row["disabled"], json!(0));

    let user = test.app.users("default").unwrap().get(&id).await.unwrap();
    assert_eq!(user["schemas"], json!(["urn:ietf:params:scim:schemas:core:2.0:User"]));
    assert_eq!(user["id"], json!(id));
    assert_eq!(user["userName"], json!("ann"));
    assert_eq!(user["name"], json!({"givenName": "Test", "familyName": "ann"}));
    assert_eq!(user["active"], json!(true));
    assert_eq!(user["meta"]["resourceType"], json!("User"));
    assert_eq!(user["meta"]["created"], json!("2023-11-14T22:13:20.000Z"));
    assert!(user.get("groups").is_none());
}

#[tokio::test]
async fn test_get_hides_deleted_resources() {
    let test = common::setup_test_app().await;
    let id = create_user(&test, "ann", true).await;
    let users = test.app.users("default").unwrap();

    users.delete(&id).await.unwrap();
    assert!(matches!(users.get(&id).await, Err(AppError::NotFound(_))));
    assert!(matches!(users.get("unknown").await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_list_with_filter_on_toggled_attribute() {
    let test = common::setup_test_app().await;
    create_user(&test, "ann", true).await;
    create_user(&test, "bob", false).await;
    create_user(&test, "cid", true).await;

    let users = test.app.users("default").unwrap();
    let response = users
        .list(&QueryParams {
            filter: Some("active eq true".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.total_results, 2);
    assert_eq!(response.start_index, Some(1));
    let names: Vec<&Value> = response.resources.iter().map(|r| &r["userName"]).collect();
    assert_eq!(names, vec![&json!("ann"), &json!("cid")]);

    let response = users
        .list(&QueryParams {
            count: Some(1),
            start_index: Some(2),
            attributes: Some("userName".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.total_results, 3);
    assert_eq!(response.items_per_page, Some(1));
    let user = &response.resources[0];
    assert_eq!(user["userName"], json!("bob"));
    assert!(user.get("name").is_none());
    assert!(user.get("id").is_some());

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["schemas"], json!(["urn:ietf:params:scim:api:messages:2.0:ListResponse"]));
    assert!(body["Resources"].is_array());
}

#[tokio::test]
async fn test_group_members_attach_and_detach() {
    let test = common::setup_test_app().await;
    let ann = create_user(&test, "ann", true).await;
    let bob = create_user(&test, "bob", true).await;
    let groups = test.app.groups("default").unwrap();
    let users = test.app.users("default").unwrap();

    let group = groups
        .create(json!({
            "displayName": "Staff",
            "members": [{"value": ann}, {"value": bob}, {"value": "no-such-user"}]
        }))
        .await
        .unwrap();
    let group_id = group["id"].as_str().unwrap().to_string();
    assert_eq!(group["displayName"], json!("Staff"));
    assert_eq!(member_ids(&group), vec![ann.clone(), bob.clone()]);
    assert_eq!(group["members"][0]["display"], json!("ann"));
    assert_eq!(group["members"][0]["type"], json!("User"));

    let group_uid = test.row("fe_groups", &group_id).await["uid"].as_i64().unwrap();
    let user = users.get(&ann).await.unwrap();
    assert_eq!(user["groups"], json!([{"value": group_uid.to_string()}]));

    // Omitting members leaves them alone
    let group = groups
        .update(&group_id, json!({"displayName": "Staff team"}))
        .await
        .unwrap();
    assert_eq!(group["displayName"], json!("Staff team"));
    assert_eq!(member_ids(&group), vec![ann.clone(), bob.clone()]);

    // Listing only bob detaches ann
    let group = groups
        .update(&group_id, json!({"members": [{"value": bob}]}))
        .await
        .unwrap();
    assert_eq!(member_ids(&group), vec![bob.clone()]);
    assert_eq!(test.row("fe_users", &ann).await["usergroup"], json!(""));
    assert!(users.get(&ann).await.unwrap().get("groups").is_none());

    // Deleting the group clears bob
    groups.delete(&group_id).await.unwrap();
    assert_eq!(test.row("fe_users", &bob).await["usergroup"], json!(""));
}

/// Two contexts sharing one pair of tables, split by `pid`.
fn two_tenant_config() -> AppConfig {
    let mut config = AppConfig::default_config();
    config.contexts[0].pid = 1;
    let mut other = config.contexts[0].clone();
    other.name = "tenant_b".to_string();
    other.pid = 2;
    config.contexts.push(other);
    config
}

#[tokio::test]
async fn test_group_members_stay_within_tenant() {
    let test = common::setup_test_app_with_config(two_tenant_config()).await;
    let ann = create_user_in(&test, "default", "ann", true).await;
    let bob = create_user_in(&test, "tenant_b", "bob", true).await;
    let groups = test.app.groups("default").unwrap();

    let group = groups
        .create(json!({
            "displayName": "A-staff",
            "members": [{"value": ann}, {"value": bob}]
        }))
        .await
        .unwrap();
    let group_id = group["id"].as_str().unwrap().to_string();
    assert_eq!(member_ids(&group), vec![ann.clone()]);
    let bob_groups = test.row("fe_users", &bob).await.get("usergroup").cloned().unwrap_or(Value::Null);
    assert!(bob_groups.is_null() || bob_groups == json!(""), "{bob_groups}");

    // A row of the other tenant listing the group is neither rendered nor detached
    let group_uid = test.row("fe_groups", &group_id).await["uid"].as_i64().unwrap();
    test.insert_row(
        "fe_users",
        json!({
            "scim_id": "foreign",
            "pid": 2,
            "deleted": 0,
            "username": "eve",
            "usergroup": group_uid.to_string()
        }),
    )
    .await;
    let group = groups.get(&group_id).await.unwrap();
    assert_eq!(member_ids(&group), vec![ann.clone()]);

    let group = groups.update(&group_id, json!({"members": []})).await.unwrap();
    assert!(group.get("members").is_none());
    assert_eq!(test.row("fe_users", &ann).await["usergroup"], json!(""));
    assert_eq!(test.row("fe_users", "foreign").await["usergroup"], json!(group_uid.to_string()));
}

#[tokio::test]
async fn test_user_groups_are_written_through_membership() {
    let test = common::setup_test_app().await;
    let users = test.app.users("default").unwrap();

    let user = users
        .create(json!({
            "userName": "ann",
            "groups": [{"value": "4"}, {"value": "5"}]
        }))
        .await
        .unwrap();
    let id = user["id"].as_str().unwrap();
    assert_eq!(test.row("fe_users", id).await["usergroup"], json!("4,5"));
    assert_eq!(user["groups"], json!([{"value": "4"}, {"value": "5"}]));
}

#[tokio::test]
async fn test_invalid_filter_is_reported() {
    let test = common::setup_test_app().await;
    let result = test
        .app
        .users("default")
        .unwrap()
        .list(&QueryParams {
            filter: Some("userName eq".to_string()),
            ..Default::default()
        })
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, AppError::FilterParse(_)));
    assert_eq!(error.to_scim_error()["scimType"], json!("invalidFilter"));
}

use super::*;
use crate::config::FeedConfig;
use chrono::TimeZone;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn feed_config(server: &MockServer) -> FeedConfig {
    FeedConfig {
        base_url: format!("{}/1.1", server.uri()),
        timeline_path: "statuses/home_timeline.json".to_string(),
        friends_path: "statuses/friends.json".to_string(),
        follow_path: "friendships/create.json".to_string(),
        unfollow_path: "friendships/destroy.json".to_string(),
        bearer_token: None,
        request_timeout: Duration::from_secs(5),
    }
}

fn client(server: &MockServer) -> HttpFeedClient {
    HttpFeedClient::new(&feed_config(server)).unwrap()
}

#[tokio::test]
async fn test_fetch_timeline_decodes_entries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/home_timeline.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "user": {"screen_name": "carol"},
                "created_at": "Wed Oct 10 20:19:24 +0000 2018",
                "text": "RT @bob: trunc",
                "retweeted_status": {
                    "user": {"screen_name": "bob"},
                    "created_at": "Wed Oct 10 20:00:00 +0000 2018",
                    "text": "the whole thing"
                }
            },
            {
                "user": {"screen_name": "alice"},
                "created_at": "2018-10-10T19:00:00Z",
                "text": "fish &amp; chips"
            }
        ])))
        .mount(&mock_server)
        .await;

    let entries = client(&mock_server).fetch_timeline().await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].author, "carol");
    assert_eq!(
        entries[0].created_at,
        Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap()
    );
    assert_eq!(
        entries[0].reshared_from,
        Some(Reshare {
            author: "bob".to_string(),
            text: "the whole thing".to_string(),
        })
    );
    // Entities are left for the sync filter to decode
    assert_eq!(entries[1].text, "fish &amp; chips");
    assert!(entries[1].reshared_from.is_none());
}

#[tokio::test]
async fn test_fetch_timeline_skips_entries_with_bad_timestamps() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/home_timeline.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"user": {"screen_name": "a"}, "created_at": "yesterday", "text": "x"},
            {"user": {"screen_name": "b"}, "created_at": "Tue, 1 Jul 2003 10:52:37 +0200", "text": "y"}
        ])))
        .mount(&mock_server)
        .await;

    let entries = client(&mock_server).fetch_timeline().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].author, "b");
}

#[tokio::test]
async fn test_fetch_timeline_sends_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/home_timeline.json"))
        .and(header("authorization", "Bearer sekrit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = feed_config(&mock_server);
    config.bearer_token = Some("sekrit".to_string());
    let entries = HttpFeedClient::new(&config)
        .unwrap()
        .fetch_timeline()
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_fetch_timeline_http_error_is_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/home_timeline.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    match client(&mock_server).fetch_timeline().await.unwrap_err() {
        UpstreamError::Status { endpoint, status } => {
            assert_eq!(status, 503);
            assert_eq!(endpoint, "/1.1/statuses/home_timeline.json");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_timeline_malformed_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/home_timeline.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&mock_server)
        .await;

    assert!(matches!(
        client(&mock_server).fetch_timeline().await,
        Err(UpstreamError::Decode(_))
    ));
}

#[tokio::test]
async fn test_list_subscriptions_accepts_both_shapes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/friends.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"screen_name": "bob"},
            {"screen_name": "alice"}
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/1.1/statuses/friends.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "users": [{"screen_name": "dave"}],
            "next_cursor": 0
        })))
        .mount(&mock_server)
        .await;

    let feed = client(&mock_server);

    let first = feed.list_subscriptions().await.unwrap();
    assert_eq!(
        first.into_iter().collect::<Vec<_>>(),
        vec!["alice".to_string(), "bob".to_string()]
    );

    let second = feed.list_subscriptions().await.unwrap();
    assert!(second.contains("dave"));
    assert_eq!(second.len(), 1);
}

#[tokio::test]
async fn test_add_subscription_posts_screen_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.1/friendships/create.json"))
        .and(body_string_contains("screen_name=bob"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"screen_name": "bob"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    client(&mock_server).add_subscription("bob").await.unwrap();
}

#[tokio::test]
async fn test_refused_follow_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.1/friendships/create.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    match client(&mock_server).add_subscription("nobody").await.unwrap_err() {
        UpstreamError::Rejected { target } => assert_eq!(target, "nobody"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unfollow_server_error_is_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1.1/friendships/destroy.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    assert!(matches!(
        client(&mock_server).remove_subscription("bob").await,
        Err(UpstreamError::Status { status: 500, .. })
    ));
}

#[test]
fn test_invalid_base_url_is_config_error() {
    let config = FeedConfig {
        base_url: "::not a url".to_string(),
        timeline_path: "statuses/home_timeline.json".to_string(),
        friends_path: "statuses/friends.json".to_string(),
        follow_path: "friendships/create.json".to_string(),
        unfollow_path: "friendships/destroy.json".to_string(),
        bearer_token: None,
        request_timeout: Duration::from_secs(5),
    };
    assert!(matches!(
        HttpFeedClient::new(&config),
        Err(crate::error::Error::Config { .. })
    ));
}

#[test]
fn test_timestamp_formats() {
    let expected = Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap();
    assert_eq!(
        http::parse_timestamp("Wed Oct 10 20:19:24 +0000 2018"),
        Some(expected)
    );
    assert_eq!(
        http::parse_timestamp("Wed, 10 Oct 2018 22:19:24 +0200"),
        Some(expected)
    );
    assert_eq!(http::parse_timestamp("2018-10-10T20:19:24Z"), Some(expected));
    assert_eq!(http::parse_timestamp("last tuesday"), None);
}

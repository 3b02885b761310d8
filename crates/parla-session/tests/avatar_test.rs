use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parla_config::TavusSettings;
use parla_session::{AvatarClient, SessionError};
use serde_json::{json, Value};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn settings(api_url: String) -> TavusSettings {
    TavusSettings {
        api_key: "tavus-key".to_string(),
        replica_id: "rf123".to_string(),
        persona_id: "p456".to_string(),
        api_url,
    }
}

#[tokio::test]
async fn creates_a_conversation_bound_to_the_room() {
    let router = Router::new().route(
        "/v2/conversations",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["replica_id"], "rf123");
            assert_eq!(body["persona_id"], "p456");
            assert_eq!(body["conversation_name"], "english-teacher-demo");
            assert_eq!(
                body["properties"]["participant_name"],
                "English-Teacher-Avatar"
            );
            Json(json!({
                "conversation_id": "c789",
                "conversation_url": "https://avatars.example/c789"
            }))
        }),
    );
    let base = serve(router).await;

    let client = AvatarClient::new(&settings(base));
    let conversation = client
        .start_conversation("english-teacher-demo")
        .await
        .expect("conversation should be created");

    assert_eq!(conversation.conversation_id, "c789");
    assert_eq!(
        conversation.conversation_url.as_deref(),
        Some("https://avatars.example/c789")
    );
}

#[tokio::test]
async fn credit_exhaustion_is_distinguishable() {
    let router = Router::new().route(
        "/v2/conversations",
        post(|| async { (StatusCode::PAYMENT_REQUIRED, "out of conversational credits") }),
    );
    let base = serve(router).await;

    let client = AvatarClient::new(&settings(base));
    let err = client.start_conversation("room").await.unwrap_err();

    assert!(err.is_avatar_credit_exhaustion());
    match err {
        SessionError::Avatar { status, message } => {
            assert_eq!(status, 402);
            assert!(message.contains("credits"));
        }
        other => panic!("expected Avatar error, got {other:?}"),
    }
}

#[tokio::test]
async fn service_errors_surface_status_and_body() {
    let router = Router::new().route(
        "/v2/conversations",
        post(|| async { (StatusCode::BAD_REQUEST, "unknown persona") }),
    );
    let base = serve(router).await;

    let client = AvatarClient::new(&settings(base));
    match client.start_conversation("room").await {
        Err(SessionError::Avatar { status: 400, message }) => {
            assert_eq!(message, "unknown persona");
        }
        other => panic!("expected Avatar error, got {other:?}"),
    }
}

#[tokio::test]
async fn end_conversation_hits_the_end_route() {
    let router = Router::new().route(
        "/v2/conversations/{id}/end",
        post(|Path(id): Path<String>| async move {
            assert_eq!(id, "c789");
            StatusCode::OK
        }),
    );
    let base = serve(router).await;

    let client = AvatarClient::new(&settings(base));
    client
        .end_conversation("c789")
        .await
        .expect("end should succeed");
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let client = AvatarClient::new(&settings("http://127.0.0.1:1".to_string()));
    match client.start_conversation("room").await {
        Err(SessionError::AvatarTransport(_)) => {}
        other => panic!("expected AvatarTransport, got {other:?}"),
    }
}

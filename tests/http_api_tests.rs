// HttpMessageApi against a local warp server

mod common;

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warp::http::StatusCode;
use warp::Filter;

use common::{me, setup_logging};
use gigconnect::api::{ApiError, HttpMessageApi, MessageApi};
use gigconnect::models::{ConversationId, MessageId, Role, SendMessageRequest, UserId};

fn client(addr: std::net::SocketAddr) -> HttpMessageApi {
    setup_logging();
    HttpMessageApi::new(&format!("http://{}/api", addr), &me(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_conversations_are_fetched_with_bearer_token() {
    let seen_auth = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorded = seen_auth.clone();
    let routes = warp::get()
        .and(warp::path!("api" / "messages" / "conversations"))
        .and(warp::header::<String>("authorization"))
        .map(move |auth: String| {
            recorded.lock().unwrap().push(auth);
            warp::reply::json(&json!([
                {
                    "id": "65f0c0",
                    "participants": ["1", "2"],
                    "otherUser": {"id": "2", "name": "Shankar Yerra", "role": "freelancer", "avatar": null},
                    "lastMessage": {"id": "m1", "content": "See you then", "senderId": "2", "createdAt": "2025-08-15T10:30:00Z"},
                    "createdAt": "2025-08-15T10:00:00Z"
                },
                {
                    "id": 2,
                    "otherUser": {"id": 3, "name": "Siva Kumar", "role": "client"}
                }
            ]))
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let conversations = client(addr).get_conversations().await.unwrap();

    assert_eq!(seen_auth.lock().unwrap().as_slice(), ["Bearer test-token"]);
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].id, ConversationId::from("65f0c0"));
    assert_eq!(conversations[0].other_user.name, "Shankar Yerra");
    let last = conversations[0].last_message.as_ref().unwrap();
    assert_eq!(last.conversation_id, ConversationId::from("65f0c0"));
    assert_eq!(last.content, "See you then");

    assert_eq!(conversations[1].id, ConversationId::from("2"));
    assert_eq!(conversations[1].other_user.role, Role::Client);
    assert!(conversations[1].last_message.is_none());
}

#[tokio::test]
async fn test_history_is_fetched_per_conversation() {
    let routes = warp::get()
        .and(warp::path!("api" / "messages" / String))
        .map(|conversation_id: String| {
            warp::reply::json(&json!([
                {"id": 1, "conversationId": conversation_id, "senderId": 1, "content": "Hi there", "createdAt": "2025-08-15T10:00:00Z"},
                {"id": 2, "senderId": "2", "content": "Hello!", "createdAt": "2025-08-15T10:01:00Z"},
                {"id": 3, "content": "no sender"}
            ]))
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let id = ConversationId::from("7");
    let messages = client(addr).get_messages(&id).await.unwrap();

    // Records without a sender are dropped
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.conversation_id == id));
    assert_eq!(messages[0].sender_id, UserId::from("1"));
    assert_eq!(messages[1].id, Some(MessageId::from("2")));
    assert_eq!(messages[1].content, "Hello!");
}

#[tokio::test]
async fn test_send_posts_camel_case_body() {
    let bodies = Arc::new(Mutex::new(Vec::<Value>::new()));
    let recorded = bodies.clone();
    let routes = warp::post()
        .and(warp::path!("api" / "messages"))
        .and(warp::body::json())
        .map(move |body: Value| {
            recorded.lock().unwrap().push(body.clone());
            // The server echoes without a sender id
            warp::reply::with_status(
                warp::reply::json(&json!({
                    "id": 512,
                    "conversationId": body["conversationId"],
                    "content": body["content"],
                    "receiverId": body["receiverId"]
                })),
                StatusCode::CREATED,
            )
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let request = SendMessageRequest {
        conversation_id: ConversationId::from("7"),
        content: "Hi Shankar".to_string(),
        receiver_id: UserId::from("2"),
    };
    let message = client(addr).send_message(&request).await.unwrap();

    assert_eq!(
        bodies.lock().unwrap().as_slice(),
        [json!({"conversationId": "7", "content": "Hi Shankar", "receiverId": "2"})]
    );
    assert_eq!(message.id, Some(MessageId::from("512")));
    assert_eq!(message.sender_id, me().id);
    assert_eq!(message.conversation_id, ConversationId::from("7"));
    assert_eq!(message.content, "Hi Shankar");
}

#[tokio::test]
async fn test_error_bodies_become_server_errors() {
    let routes = warp::get()
        .and(warp::path!("api" / "messages" / String))
        .map(|conversation_id: String| match conversation_id.as_str() {
            "missing" => warp::reply::with_status(
                json!({"message": "Conversation not found"}).to_string(),
                StatusCode::NOT_FOUND,
            ),
            "invalid" => warp::reply::with_status(
                json!({"errors": [{"msg": "Invalid conversation id"}, {"msg": "second"}]}).to_string(),
                StatusCode::BAD_REQUEST,
            ),
            _ => warp::reply::with_status("upstream down".to_string(), StatusCode::INTERNAL_SERVER_ERROR),
        });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    let api = client(addr);

    match api.get_messages(&ConversationId::from("missing")).await {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Conversation not found");
        }
        other => panic!("Expected server error, got {:?}", other),
    }

    match api.get_messages(&ConversationId::from("invalid")).await {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid conversation id");
        }
        other => panic!("Expected server error, got {:?}", other),
    }

    match api.get_messages(&ConversationId::from("7")).await {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Request failed with status 500");
        }
        other => panic!("Expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unexpected_body_is_a_decode_error() {
    let routes = warp::get()
        .and(warp::path!("api" / "messages" / "conversations"))
        .map(|| warp::reply::json(&json!({"conversations": []})));
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let result = client(addr).get_conversations().await;
    assert!(matches!(result, Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn test_unreachable_server_is_a_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(addr).get_conversations().await;
    assert!(matches!(result, Err(ApiError::Request(_))));
}

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result;
use notification_service::{
    clients::{
        adapter::{ChannelAdapter, ChannelAdapters, DisabledAdapter},
        fcm::{FcmPushAdapter, StaticToken},
        mailgun::MailgunEmailAdapter,
        profile_store::ProfileStoreClient,
        smtp::SmtpEmailAdapter,
        twilio::{TwilioCredentials, TwilioSmsAdapter},
    },
    config::Config,
    error::ProfileStoreError,
    models::{
        channel::{Channel, ChannelErrorCode, ChannelTarget},
        template::RenderedContent,
    },
};
use reqwest::Client;
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
};
use tokio_test::assert_ok;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, body_string_contains, header, header_exists, method, path},
};

use crate::common::PUSH_TOKEN;

const ACCOUNT_SID: &str = "AC0123456789abcdef0123456789abcdef";

fn twilio(server: &MockServer) -> TwilioSmsAdapter {
    TwilioSmsAdapter::new(
        Client::new(),
        &server.uri(),
        TwilioCredentials {
            account_sid: ACCOUNT_SID.to_string(),
            auth_token: "auth-token".to_string(),
            from_number: "+15005550006".to_string(),
        },
        "33",
    )
}

fn twilio_path() -> String {
    format!("/2010-04-01/Accounts/{}/Messages.json", ACCOUNT_SID)
}

fn mailgun(server: &MockServer) -> MailgunEmailAdapter {
    MailgunEmailAdapter::new(
        Client::new(),
        &server.uri(),
        "mg.example.com",
        "key-123",
        "RoadTrip <contact@example.com>",
    )
}

fn fcm(server: &MockServer) -> FcmPushAdapter {
    FcmPushAdapter::with_client(
        Client::new(),
        &server.uri(),
        "roadtrip-app",
        Arc::new(StaticToken("ya29.test-token".to_string())),
    )
}

/// Scripted SMTP peer for one connection. Replies to AUTH and RCPT with the given lines.
async fn smtp_server(auth_reply: Option<&'static str>, rcpt_reply: &'static str) -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut in_data = false;

        if write.write_all(b"220 localhost ESMTP\r\n").await.is_err() {
            return;
        }

        while let Ok(Some(line)) = lines.next_line().await {
            if in_data {
                if line == "." {
                    in_data = false;
                    let _ = write.write_all(b"250 2.0.0 Ok: queued\r\n").await;
                }
                continue;
            }

            let command = line.to_ascii_uppercase();
            let reply = if command.starts_with("EHLO") {
                match auth_reply {
                    Some(_) => "250-localhost\r\n250 AUTH PLAIN LOGIN",
                    None => "250 localhost",
                }
            } else if command.starts_with("AUTH") {
                auth_reply.unwrap_or("503 5.5.1 AUTH not enabled")
            } else if command.starts_with("RCPT") {
                rcpt_reply
            } else if command.starts_with("DATA") {
                in_data = true;
                "354 End data with <CR><LF>.<CR><LF>"
            } else if command.starts_with("QUIT") {
                let _ = write.write_all(b"221 2.0.0 Bye\r\n").await;
                break;
            } else {
                "250 2.0.0 Ok"
            };

            if write.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                break;
            }
        }
    });

    Ok(port)
}

fn smtp(port: u16, with_credentials: bool) -> Result<SmtpEmailAdapter> {
    let mut settings = json!({
        "profile_store_url": "http://127.0.0.1:9",
        "profile_store_api_key": "test-key",
        "smtp_host": "127.0.0.1",
        "smtp_port": port,
        "smtp_use_tls": false,
        "channel_timeout_ms": 2_000,
    });
    if with_credentials {
        settings["smtp_username"] = json!("mailer");
        settings["smtp_password"] = json!("wrong-password");
    }

    let config: Config = serde_json::from_value(settings)?;
    SmtpEmailAdapter::from_config(&config)
}

fn sms(body: &str) -> RenderedContent {
    RenderedContent::Sms {
        body: body.to_string(),
    }
}

fn email() -> RenderedContent {
    RenderedContent::Email {
        subject: "Your invoice".to_string(),
        html: "<p>Invoice</p>".to_string(),
        text: "Invoice".to_string(),
    }
}

fn push() -> RenderedContent {
    RenderedContent::Push {
        title: "Subscription active".to_string(),
        body: "Your Gold subscription is now active.".to_string(),
        data: BTreeMap::from([("template".to_string(), "subscription_started".to_string())]),
    }
}

/// Test: Twilio accepts a normalized number and returns the message sid
#[tokio::test]
async fn test_twilio_delivers_sms() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(twilio_path()))
        .and(header_exists("authorization"))
        .and(body_string_contains("To=%2B33612345678"))
        .and(body_string_contains("From=%2B15005550006"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM42", "status": "queued" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = twilio(&server)
        .send(&ChannelTarget::Sms("06 12 34 56 78".to_string()), &sms("hello"))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.message_id.as_deref(), Some("SM42"));

    Ok(())
}

/// Test: Twilio invalid-number codes and outages map to distinct failures
#[tokio::test]
async fn test_twilio_failures_are_normalized() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(twilio_path()))
        .and(body_string_contains("To=%2B33600000000"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 21211,
            "message": "The 'To' number is not a valid phone number.",
            "status": 400
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(twilio_path()))
        .and(body_string_contains("To=%2B33611111111"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter = twilio(&server);

    let invalid = adapter
        .send(&ChannelTarget::Sms("+33600000000".to_string()), &sms("hi"))
        .await;
    assert_eq!(invalid.error_code, Some(ChannelErrorCode::InvalidTarget));

    let down = adapter
        .send(&ChannelTarget::Sms("+33611111111".to_string()), &sms("hi"))
        .await;
    assert_eq!(down.error_code, Some(ChannelErrorCode::ProviderUnavailable));

    Ok(())
}

/// Test: An unusable phone number fails before any provider call
#[tokio::test]
async fn test_twilio_rejects_bad_number_locally() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM1" })))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = twilio(&server)
        .send(&ChannelTarget::Sms("call me maybe".to_string()), &sms("hi"))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_code, Some(ChannelErrorCode::InvalidTarget));

    Ok(())
}

/// Test: Mailgun queues the message and returns its id
#[tokio::test]
async fn test_mailgun_delivers_email() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .and(header_exists("authorization"))
        .and(body_string_contains("to=ana%40example.com"))
        .and(body_string_contains("subject=Your+invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "<20240301.1@mg.example.com>",
            "message": "Queued. Thank you."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = mailgun(&server)
        .send(&ChannelTarget::Email("ana@example.com".to_string()), &email())
        .await;

    assert!(outcome.success);
    assert_eq!(
        outcome.message_id.as_deref(),
        Some("<20240301.1@mg.example.com>")
    );

    Ok(())
}

/// Test: Mailgun throttling is reported as rate limited
#[tokio::test]
async fn test_mailgun_rate_limited() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "message": "slow down" })))
        .mount(&server)
        .await;

    let outcome = mailgun(&server)
        .send(&ChannelTarget::Email("ana@example.com".to_string()), &email())
        .await;

    assert_eq!(outcome.error_code, Some(ChannelErrorCode::RateLimited));
    assert!(outcome.error_message.unwrap_or_default().contains("slow down"));

    Ok(())
}

/// Test: A malformed address never reaches Mailgun
#[tokio::test]
async fn test_mailgun_rejects_bad_address_locally() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = mailgun(&server)
        .send(&ChannelTarget::Email("ana.example.com".to_string()), &email())
        .await;

    assert_eq!(outcome.error_code, Some(ChannelErrorCode::InvalidTarget));

    Ok(())
}

/// Test: FCM sends with the bearer token and returns the trailing message id
#[tokio::test]
async fn test_fcm_delivers_push() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/projects/roadtrip-app/messages:send"))
        .and(header("authorization", "Bearer ya29.test-token"))
        .and(body_partial_json(json!({
            "message": {
                "token": PUSH_TOKEN,
                "notification": { "title": "Subscription active" },
                "data": { "template": "subscription_started" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/roadtrip-app/messages/0:1700000000%abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fcm(&server)
        .send(&ChannelTarget::Push(PUSH_TOKEN.to_string()), &push())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.message_id.as_deref(), Some("0:1700000000%abc"));

    Ok(())
}

/// Test: An unregistered device token is an invalid target
#[tokio::test]
async fn test_fcm_unregistered_token() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "Requested entity was not found.",
                "status": "NOT_FOUND",
                "details": [{ "errorCode": "UNREGISTERED" }]
            }
        })))
        .mount(&server)
        .await;

    let outcome = fcm(&server)
        .send(&ChannelTarget::Push(PUSH_TOKEN.to_string()), &push())
        .await;

    assert!(outcome.is_invalid_target());

    Ok(())
}

/// Test: A malformed device token never reaches FCM
#[tokio::test]
async fn test_fcm_rejects_bad_token_locally() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = fcm(&server)
        .send(&ChannelTarget::Push("short".to_string()), &push())
        .await;

    assert_eq!(outcome.error_code, Some(ChannelErrorCode::InvalidTarget));

    Ok(())
}

/// Test: Content for the wrong channel is refused without a provider call
#[tokio::test]
async fn test_adapter_refuses_mismatched_content() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = fcm(&server)
        .send(&ChannelTarget::Push(PUSH_TOKEN.to_string()), &sms("hi"))
        .await;

    assert_eq!(outcome.channel, Channel::Push);
    assert_eq!(outcome.error_code, Some(ChannelErrorCode::Unknown));

    Ok(())
}

/// Test: Disabled channels fail fast as provider unavailable
#[tokio::test]
async fn test_disabled_adapters() -> Result<()> {
    let adapters = ChannelAdapters::disabled("no credentials in test");

    for (channel, adapter) in adapters.iter() {
        assert!(!adapter.is_enabled());
        assert_eq!(adapter.channel(), channel);
    }

    let disabled = DisabledAdapter::new(Channel::Sms, "twilio not configured");
    let target = ChannelTarget::Sms("+33612345678".to_string());
    let first = disabled.send(&target, &sms("hi")).await;
    let second = disabled.send(&target, &sms("hi")).await;

    assert!(!first.success);
    assert_eq!(first.error_code, Some(ChannelErrorCode::ProviderUnavailable));
    assert_eq!(first.error_message, second.error_message);

    Ok(())
}

/// Test: Profile store lookups read stored documents and mark channels invalid
#[tokio::test]
async fn test_profile_store_client() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/u-42"))
        .and(header("authorization", "Bearer store-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "u-42",
            "firstName": "Ana",
            "email": "ana@example.com",
            "firebaseToken": PUSH_TOKEN
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/users/u-42/channels/push"))
        .and(body_json(json!({ "valid": false })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = ProfileStoreClient::new(&server.uri(), "store-key", Duration::from_secs(2))?;

    let recipient = client.get_recipient("u-42").await?;
    assert_eq!(recipient.first_name.as_deref(), Some("Ana"));
    assert_eq!(
        recipient.target_for(Channel::Push),
        Some(ChannelTarget::Push(PUSH_TOKEN.to_string()))
    );

    assert!(matches!(
        client.get_recipient("missing").await,
        Err(ProfileStoreError::NotFound)
    ));

    assert_ok!(client.mark_channel_invalid("u-42", Channel::Push).await);

    Ok(())
}

/// Test: A body longer than one SMS segment is still sent in full
#[tokio::test]
async fn test_twilio_sends_long_body_unchanged() -> Result<()> {
    let server = MockServer::start().await;
    let body = "a".repeat(200);

    Mock::given(method("POST"))
        .and(path(twilio_path()))
        .and(body_string_contains(format!("Body={}", body)))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM200", "status": "queued" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = twilio(&server)
        .send(&ChannelTarget::Sms("+33612345678".to_string()), &sms(&body))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.error_code, None);
    assert_eq!(outcome.message_id.as_deref(), Some("SM200"));

    Ok(())
}

/// Test: A wrong FCM endpoint is an outage, not a stale device token
#[tokio::test]
async fn test_fcm_missing_endpoint_is_provider_unavailable() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string("<html><body>404 Not Found</body></html>"),
        )
        .mount(&server)
        .await;

    let outcome = fcm(&server)
        .send(&ChannelTarget::Push(PUSH_TOKEN.to_string()), &push())
        .await;

    assert!(!outcome.is_invalid_target());
    assert_eq!(
        outcome.error_code,
        Some(ChannelErrorCode::ProviderUnavailable)
    );

    Ok(())
}

/// Test: FCM blames the token only when the bad argument is the token field
#[tokio::test]
async fn test_fcm_invalid_token_argument() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "The registration token is not a valid FCM registration token",
                "status": "INVALID_ARGUMENT",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.BadRequest",
                    "fieldViolations": [{ "field": "message.token", "description": "Invalid registration token" }]
                }]
            }
        })))
        .mount(&server)
        .await;

    let outcome = fcm(&server)
        .send(&ChannelTarget::Push(PUSH_TOKEN.to_string()), &push())
        .await;

    assert!(outcome.is_invalid_target());

    Ok(())
}

/// Test: SMTP relay accepts the message and the adapter returns its Message-ID
#[tokio::test]
async fn test_smtp_delivers_email() -> Result<()> {
    let port = smtp_server(None, "250 2.1.5 Ok").await?;

    let outcome = smtp(port, false)?
        .send(&ChannelTarget::Email("ana@example.com".to_string()), &email())
        .await;

    assert!(outcome.success, "{:?}", outcome.error_message);
    let message_id = outcome.message_id.unwrap_or_default();
    assert!(message_id.starts_with('<') && message_id.ends_with("@yourapp.com>"));

    Ok(())
}

/// Test: Rejected SMTP credentials are a provider outage
#[tokio::test]
async fn test_smtp_auth_failure_is_provider_unavailable() -> Result<()> {
    let port = smtp_server(
        Some("535 5.7.8 Authentication credentials invalid"),
        "250 2.1.5 Ok",
    )
    .await?;

    let outcome = smtp(port, true)?
        .send(&ChannelTarget::Email("ana@example.com".to_string()), &email())
        .await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error_code,
        Some(ChannelErrorCode::ProviderUnavailable)
    );

    Ok(())
}

/// Test: A mailbox rejected at RCPT is an invalid target
#[tokio::test]
async fn test_smtp_unknown_mailbox_is_invalid_target() -> Result<()> {
    let port = smtp_server(None, "550 5.1.1 <ghost@example.com>: No such user").await?;

    let outcome = smtp(port, false)?
        .send(&ChannelTarget::Email("ghost@example.com".to_string()), &email())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_code, Some(ChannelErrorCode::InvalidTarget));

    Ok(())
}

/// Test: An SMTP relay that refuses connections is a provider outage
#[tokio::test]
async fn test_smtp_unreachable_relay() -> Result<()> {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };

    let outcome = smtp(port, false)?
        .send(&ChannelTarget::Email("ana@example.com".to_string()), &email())
        .await;

    assert_eq!(
        outcome.error_code,
        Some(ChannelErrorCode::ProviderUnavailable)
    );

    Ok(())
}

//! Integration tests for net crate

#[cfg(test)]
mod tests {
    use dstage_errors::{Error, NetworkError};
    use dstage_events::{channel, AppEvent, EventSender, GeneralEvent};
    use dstage_net::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn quiet() -> Option<EventSender> {
        None
    }

    fn client() -> NetClient {
        NetClient::new(NetConfig {
            retry_count: 0,
            ..NetConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_text() {
        let server = MockServer::start();
        let (tx, mut rx) = channel();

        let mock = server.mock(|when, then| {
            when.method(GET).path("/job/Worker/lastBuild/buildNumber");
            then.status(200).body("41");
        });

        let url = server.url("/job/Worker/lastBuild/buildNumber");
        let body = fetch_text(&client(), &url, &tx).await.unwrap();

        mock.assert();
        assert_eq!(body, "41");

        let message = rx.try_recv().unwrap();
        assert!(matches!(
            message.event,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_text_optional_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/job/Worker/lastBuild/buildNumber");
            then.status(404);
        });

        let url = server.url("/job/Worker/lastBuild/buildNumber");
        let body = fetch_text_optional(&client(), &url, &quiet()).await.unwrap();
        assert_eq!(body, None);
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/broken");
            then.status(500);
        });

        let err = fetch_text(&client(), &server.url("/broken"), &quiet())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::HttpError { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_post_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/job/Worker/buildWithParameters")
                .query_param("tasks", "core:test base:test")
                .query_param("commit", "d10e26a2");
            then.status(201);
        });

        let url = server.url("/job/Worker/buildWithParameters");
        post_query(
            &client(),
            &url,
            &[("tasks", "core:test base:test"), ("commit", "d10e26a2")],
            &quiet(),
        )
        .await
        .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(429).header("retry-after", "7");
        });

        let err = client().get(&server.url("/busy")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::RateLimited { seconds: 7 })
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let client = NetClient::new(NetConfig {
            retry_count: 1,
            retry_delay: Duration::from_millis(1),
            connect_timeout: Duration::from_secs(2),
            ..NetConfig::default()
        })
        .unwrap();

        assert!(client.get("http://127.0.0.1:9/").await.is_err());
    }

    #[tokio::test]
    async fn test_post_query_sent_once_on_timeout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/job/Worker/buildWithParameters");
            then.status(201).delay(Duration::from_millis(400));
        });
        let client = NetClient::new(NetConfig {
            timeout: Duration::from_millis(100),
            retry_count: 3,
            retry_delay: Duration::from_millis(1),
            ..NetConfig::default()
        })
        .unwrap();

        let err = post_query(
            &client,
            &server.url("/job/Worker/buildWithParameters"),
            &[("tasks", "test"), ("commit", "abc")],
            &quiet(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Network(NetworkError::Timeout { .. })));
        // Give any late retry a chance to show up before counting
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn test_get_retried_on_timeout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(400));
        });
        let client = NetClient::new(NetConfig {
            timeout: Duration::from_millis(100),
            retry_count: 2,
            retry_delay: Duration::from_millis(1),
            ..NetConfig::default()
        })
        .unwrap();

        assert!(client.get(&server.url("/slow")).await.is_err());
        assert_eq!(mock.hits(), 3);
    }
}

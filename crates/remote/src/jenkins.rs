//! HTTP implementation of [`RemoteJobApi`] for Jenkins-style job servers

use crate::api::{BuildStatus, RemoteJobApi};
use async_trait::async_trait;
use dstage_errors::{Error, NetworkError};
use dstage_events::EventSender;
use dstage_net::{fetch_text, fetch_text_optional, join_url, post_query, NetClient};
use regex::Regex;

/// Talks to `{job}/lastBuild/buildNumber`, `{job}/buildWithParameters` and
/// `{job}/{n}/api/xml`
#[derive(Clone, Debug)]
pub struct JenkinsApi {
    client: NetClient,
    patterns: StatusPatterns,
    events: Option<EventSender>,
}

/// Element extractors for the build status XML document
#[derive(Clone, Debug)]
struct StatusPatterns {
    building: Regex,
    result: Regex,
    url: Regex,
}

impl StatusPatterns {
    fn new() -> Result<Self, Error> {
        let element = |name: &str| {
            Regex::new(&format!(r"<{name}>\s*([^<]*?)\s*</{name}>"))
                .map_err(|e| Error::internal(format!("invalid {name} pattern: {e}")))
        };

        Ok(Self {
            building: element("building")?,
            result: element("result")?,
            url: element("url")?,
        })
    }

    fn capture<'a>(pattern: &Regex, xml: &'a str) -> Option<&'a str> {
        pattern
            .captures(xml)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn parse(&self, url: &str, xml: &str) -> Result<BuildStatus, Error> {
        let building = match Self::capture(&self.building, xml) {
            Some("true") => true,
            Some("false") => false,
            other => {
                return Err(NetworkError::InvalidResponse {
                    url: url.to_string(),
                    message: format!("unexpected <building> value: {other:?}"),
                }
                .into())
            }
        };

        let result = Self::capture(&self.result, xml)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);
        let url = Self::capture(&self.url, xml)
            .filter(|value| !value.is_empty())
            .map(unescape);

        Ok(BuildStatus {
            building,
            result,
            url,
        })
    }
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

impl JenkinsApi {
    /// Create an API client over `client`
    ///
    /// # Errors
    ///
    /// Returns an internal error if the status patterns fail to compile.
    pub fn new(client: NetClient) -> Result<Self, Error> {
        Ok(Self {
            client,
            patterns: StatusPatterns::new()?,
            events: None,
        })
    }

    /// Report every HTTP request as a debug event
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }
}

#[async_trait]
impl RemoteJobApi for JenkinsApi {
    async fn last_build_number(&self, job: &str) -> Result<Option<u64>, Error> {
        let url = join_url(job, "lastBuild/buildNumber")?;
        let Some(body) = fetch_text_optional(&self.client, &url, &self.events).await? else {
            return Ok(None);
        };

        body.trim().parse().map(Some).map_err(|_| {
            NetworkError::InvalidResponse {
                url,
                message: format!("expected a build number, got {:?}", body.trim()),
            }
            .into()
        })
    }

    async fn trigger(&self, job: &str, tasks: &[String], commit: &str) -> Result<(), Error> {
        let url = join_url(job, "buildWithParameters")?;
        let tasks = tasks.join(" ");
        post_query(
            &self.client,
            &url,
            &[("tasks", tasks.as_str()), ("commit", commit)],
            &self.events,
        )
        .await
    }

    async fn build_status(&self, job: &str, number: u64) -> Result<BuildStatus, Error> {
        let url = join_url(job, &format!("{number}/api/xml?depth=0"))?;
        let xml = fetch_text(&self.client, &url, &self.events).await?;
        self.patterns.parse(&url, &xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINISHED: &str = r#"<freeStyleBuild _class="hudson.model.FreeStyleBuild">
<action _class="hudson.model.CauseAction"><cause><shortDescription>Started remotely</shortDescription></cause></action>
<building>false</building><displayName>#6</displayName><duration>61234</duration>
<number>6</number><result>SUCCESS</result><timestamp>1540000000000</timestamp>
<url>http://ci/job/GradleWorker/6/?a=1&amp;b=2</url><builtOn>agent-7</builtOn>
</freeStyleBuild>"#;

    #[test]
    fn test_parse_finished() {
        let patterns = StatusPatterns::new().unwrap();
        let status = patterns.parse("http://ci", FINISHED).unwrap();
        assert!(!status.building);
        assert!(status.is_success());
        assert_eq!(status.result.as_deref(), Some("SUCCESS"));
        assert_eq!(
            status.url.as_deref(),
            Some("http://ci/job/GradleWorker/6/?a=1&b=2")
        );
    }

    #[test]
    fn test_parse_running() {
        let patterns = StatusPatterns::new().unwrap();
        let status = patterns
            .parse("http://ci", "<build><building>true</building><result></result></build>")
            .unwrap();
        assert!(status.building);
        assert_eq!(status.result, None);
        assert_eq!(status.url, None);
    }

    #[test]
    fn test_parse_garbage() {
        let patterns = StatusPatterns::new().unwrap();
        let err = patterns.parse("http://ci", "<html>oops</html>").unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_failure_result() {
        let status = BuildStatus {
            building: false,
            result: Some("FAILURE".into()),
            url: None,
        };
        assert!(!status.is_success());
    }
}

use super::{emit, Source, SourceResult, SOURCE_CHANNEL_CAPACITY};
use crate::session::Session;
use crate::stats::{Statistics, StatsCounter};
use crate::{Error, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

const AUTODISCOVER_URL: &str = "https://autodiscover-s.outlook.com/autodiscover/autodiscover.svc";
const SOAP_ACTION: &str =
    "http://schemas.microsoft.com/exchange/2010/Autodiscover/Autodiscover/GetFederationInformation";
const USER_AGENT: &str = "AutodiscoverClient";

// region:        --- Source info

/// Lists the domains federated with the target's Microsoft 365 tenant, through
/// the Exchange autodiscover `GetFederationInformation` operation.
pub struct Aad {
    endpoint: String,
    stats: StatsCounter,
}

impl Aad {
    pub fn new() -> Self {
        Self::with_endpoint(AUTODISCOVER_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            stats: StatsCounter::default(),
        }
    }
}

impl Default for Aad {
    fn default() -> Self {
        Self::new()
    }
}

// endregion:     --- Source info

impl Source for Aad {
    fn name(&self) -> &'static str {
        "aad"
    }

    fn description(&self) -> &'static str {
        "Use Exchange autodiscover federation info to find tenant domains"
    }

    fn needs_key(&self) -> bool {
        false
    }

    fn is_default(&self) -> bool {
        true
    }

    fn run(
        self: Arc<Self>,
        cancel: CancellationToken,
        domain: String,
        session: Arc<Session>,
    ) -> mpsc::Receiver<SourceResult> {
        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        self.stats.reset();

        tokio::spawn(async move {
            let start = Instant::now();

            // a single request, so the first failure ends the run
            match self.fetch_domains(&cancel, &session, &domain).await {
                Ok(domains) => {
                    for found in domains {
                        if cancel.is_cancelled() {
                            break;
                        }
                        if !emit(&tx, &self.stats, SourceResult::domain(self.name(), found)).await {
                            break;
                        }
                    }
                }
                Err(Error::Cancelled) => debug!("Cancelled before the lookup completed"),
                Err(err) => {
                    let message = format!("failed to fetch domains: {err}");
                    emit(&tx, &self.stats, SourceResult::error(self.name(), message)).await;
                }
            }

            self.stats.set_time_taken(start.elapsed());
        });

        rx
    }

    fn statistics(&self) -> Statistics {
        self.stats.snapshot()
    }
}

impl Aad {
    #[instrument(name = "fetch_domains", level = "debug", fields(source = %self.name()), skip_all)]
    async fn fetch_domains(
        &self,
        cancel: &CancellationToken,
        session: &Session,
        domain: &str,
    ) -> Result<Vec<String>> {
        let request = session
            .client()
            .post(&self.endpoint)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(federation_request(domain));

        let res = session.execute(cancel, self.name(), request).await?;
        if !res.status().is_success() {
            return Err(Error::InvalidHttpResponse(format!(
                "{}: status {}",
                self.name(),
                res.status()
            )));
        }

        let body = res.text().await?;
        let info = parse_federation_response(&body)?;

        if info.error_code != "NoError" {
            let message = if info.error_message.is_empty() {
                format!("error code {:?}", info.error_code)
            } else {
                info.error_message
            };
            return Err(Error::Federation(message));
        }

        debug!("{} collected", info.domains.len());
        Ok(info.domains)
    }
}

// region:        --- SOAP envelope

fn federation_request(domain: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:exm="http://schemas.microsoft.com/exchange/services/2006/messages" xmlns:ext="http://schemas.microsoft.com/exchange/services/2006/types" xmlns:a="http://www.w3.org/2005/08/addressing" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <soap:Header>
    <a:Action soap:mustUnderstand="1">{SOAP_ACTION}</a:Action>
    <a:To soap:mustUnderstand="1">{AUTODISCOVER_URL}</a:To>
    <a:ReplyTo>
      <a:Address>http://www.w3.org/2005/08/addressing/anonymous</a:Address>
    </a:ReplyTo>
  </soap:Header>
  <soap:Body>
    <GetFederationInformationRequestMessage xmlns="http://schemas.microsoft.com/exchange/2010/Autodiscover">
      <Request>
        <Domain>{}</Domain>
      </Request>
    </GetFederationInformationRequestMessage>
  </soap:Body>
</soap:Envelope>"#,
        escape(domain)
    )
}

#[derive(Debug, Default, PartialEq, Eq)]
struct FederationInfo {
    error_code: String,
    error_message: String,
    domains: Vec<String>,
}

#[derive(Clone, Copy)]
enum Field {
    ErrorCode,
    ErrorMessage,
    Domain,
}

/// Pulls the response code and the `<Domains>` list out of a
/// `GetFederationInformationResponseMessage`, ignoring namespace prefixes.
fn parse_federation_response(body: &str) -> Result<FederationInfo> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut info = FederationInfo::default();
    let mut in_domains = false;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                field = match e.local_name().as_ref() {
                    b"Domains" => {
                        in_domains = true;
                        None
                    }
                    b"Domain" if in_domains => Some(Field::Domain),
                    b"ErrorCode" => Some(Field::ErrorCode),
                    b"ErrorMessage" => Some(Field::ErrorMessage),
                    _ => None,
                };
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"Domains" {
                    in_domains = false;
                }
                field = None;
            }
            Event::Text(text) => {
                if let Some(field) = field {
                    let value = text.unescape()?.into_owned();
                    trace!("Collecting: {:?}", value);
                    match field {
                        Field::ErrorCode => info.error_code = value,
                        Field::ErrorMessage => info.error_message = value,
                        Field::Domain => info.domains.push(value),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(info)
}

// endregion:     --- SOAP envelope

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiter;
    use crate::sources::ResultKind;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" xmlns:a="http://www.w3.org/2005/08/addressing">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.microsoft.com/exchange/2010/Autodiscover/Autodiscover/GetFederationInformationResponse</a:Action>
  </s:Header>
  <s:Body>
    <GetFederationInformationResponseMessage xmlns="http://schemas.microsoft.com/exchange/2010/Autodiscover">
      <Response xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
        <ErrorCode>NoError</ErrorCode>
        <ErrorMessage />
        <ApplicationUri>urn:federation:MicrosoftOnline</ApplicationUri>
        <Domains>
          <Domain>contoso.com</Domain>
          <Domain>contoso.onmicrosoft.com</Domain>
          <Domain>fabrikam.com</Domain>
        </Domains>
        <TokenIssuers>
          <TokenIssuer>
            <Endpoint>https://login.microsoftonline.com/extSTS.srf</Endpoint>
          </TokenIssuer>
        </TokenIssuers>
      </Response>
    </GetFederationInformationResponseMessage>
  </s:Body>
</s:Envelope>"#;

    const ERROR_RESPONSE: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <GetFederationInformationResponseMessage xmlns="http://schemas.microsoft.com/exchange/2010/Autodiscover">
      <Response>
        <ErrorCode>InvalidDomain</ErrorCode>
        <ErrorMessage>The domain is not valid.</ErrorMessage>
        <Domains />
      </Response>
    </GetFederationInformationResponseMessage>
  </s:Body>
</s:Envelope>"#;

    fn session() -> Arc<Session> {
        Arc::new(
            Session::new(None, Duration::from_secs(5), Arc::new(RateLimiter::unlimited())).unwrap(),
        )
    }

    async fn collect(mut rx: mpsc::Receiver<SourceResult>) -> Vec<SourceResult> {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    #[test]
    fn parse_domains_from_response() {
        let info = parse_federation_response(RESPONSE).unwrap();
        assert_eq!(info.error_code, "NoError");
        assert_eq!(
            info.domains,
            vec!["contoso.com", "contoso.onmicrosoft.com", "fabrikam.com"]
        );
    }

    #[test]
    fn parse_error_response() {
        let info = parse_federation_response(ERROR_RESPONSE).unwrap();
        assert_eq!(info.error_code, "InvalidDomain");
        assert_eq!(info.error_message, "The domain is not valid.");
        assert!(info.domains.is_empty());
    }

    #[test]
    fn malformed_response_is_an_error() {
        assert!(parse_federation_response("<a><b></a>").is_err());
    }

    #[test]
    fn request_escapes_the_domain() {
        let request = federation_request("a&b.com");
        assert!(request.contains("<Domain>a&amp;b.com</Domain>"));
        assert!(request.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
    }

    #[tokio::test]
    async fn run_yields_federated_domains() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/autodiscover/autodiscover.svc"))
            .and(header("SOAPAction", SOAP_ACTION))
            .and(header("User-Agent", USER_AGENT))
            .and(body_string_contains("<Domain>contoso.com</Domain>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
            .expect(1)
            .mount(&server)
            .await;

        let source = Arc::new(Aad::with_endpoint(format!(
            "{}/autodiscover/autodiscover.svc",
            server.uri()
        )));
        let rx = Arc::clone(&source).run(
            CancellationToken::new(),
            "contoso.com".to_string(),
            session(),
        );
        let results = collect(rx).await;

        assert_eq!(
            results,
            vec![
                SourceResult::domain("aad", "contoso.com"),
                SourceResult::domain("aad", "contoso.onmicrosoft.com"),
                SourceResult::domain("aad", "fabrikam.com"),
            ]
        );
        let stats = source.statistics();
        assert_eq!(stats.results, 3);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn federation_error_becomes_an_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ERROR_RESPONSE))
            .mount(&server)
            .await;

        let source = Arc::new(Aad::with_endpoint(server.uri()));
        let rx = Arc::clone(&source).run(
            CancellationToken::new(),
            "nope.invalid".to_string(),
            session(),
        );
        let results = collect(rx).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "aad");
        match &results[0].kind {
            ResultKind::Error(message) => assert!(message.contains("The domain is not valid.")),
            other => panic!("unexpected result: {other:?}"),
        }
        let stats = source.statistics();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.results, 0);
    }

    #[tokio::test]
    async fn http_failure_becomes_an_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = Arc::new(Aad::with_endpoint(server.uri()));
        let results = collect(Arc::clone(&source).run(
            CancellationToken::new(),
            "contoso.com".to_string(),
            session(),
        ))
        .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].kind, ResultKind::Error(_)));
        assert_eq!(source.statistics().errors, 1);
    }

    #[tokio::test]
    async fn cancelled_run_closes_promptly() {
        let source = Arc::new(Aad::with_endpoint("http://127.0.0.1:9"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = collect(Arc::clone(&source).run(cancel, "contoso.com".to_string(), session())).await;
        assert!(results.is_empty());
        assert_eq!(source.statistics().errors, 0);
    }
}

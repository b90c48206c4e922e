//! Transport probe
//!
//! Verifies that plaintext access is blocked or redirected to HTTPS, then
//! performs per-version TLS handshakes recording which protocol versions the
//! endpoint accepts. A refused legacy handshake is the expected passing
//! finding, never an error; an unreachable host is a classified probe error,
//! never a compliance failure.
//!
//! TLS 1.3 and 1.2 are negotiated with version-pinned rustls configurations.
//! rustls deliberately does not implement TLS 1.1/1.0, so the legacy attempts
//! send a hand-built ClientHello over a raw TCP stream and classify the
//! ServerHello (or alert/close) that comes back.

use async_trait::async_trait;
use rand::RngCore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::engine::model::Target;
use crate::error::ProbeError;
use crate::http::{Fetcher, RedirectMode};

/// TLS protocol versions the probe can attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    pub const ALL: &'static [TlsVersion] = &[
        TlsVersion::Tls13,
        TlsVersion::Tls12,
        TlsVersion::Tls11,
        TlsVersion::Tls10,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLS1.0",
            TlsVersion::Tls11 => "TLS1.1",
            TlsVersion::Tls12 => "TLS1.2",
            TlsVersion::Tls13 => "TLS1.3",
        }
    }

    /// Policy configuration names versions as "1.0", "1.1", ...
    pub fn from_policy_name(name: &str) -> Option<Self> {
        match name.trim() {
            "1.0" => Some(TlsVersion::Tls10),
            "1.1" => Some(TlsVersion::Tls11),
            "1.2" => Some(TlsVersion::Tls12),
            "1.3" => Some(TlsVersion::Tls13),
            _ => None,
        }
    }

    /// Wire encoding of the protocol version (ClientHello legacy_version)
    fn wire_bytes(&self) -> [u8; 2] {
        match self {
            TlsVersion::Tls10 => [0x03, 0x01],
            TlsVersion::Tls11 => [0x03, 0x02],
            TlsVersion::Tls12 => [0x03, 0x03],
            TlsVersion::Tls13 => [0x03, 0x04],
        }
    }
}

/// Outcome of one version-pinned handshake attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsAttempt {
    Accepted { detail: String },
    Refused { reason: String },
}

impl TlsAttempt {
    pub fn accepted(&self) -> bool {
        matches!(self, TlsAttempt::Accepted { .. })
    }
}

/// Capability interface for version-pinned handshakes
#[async_trait]
pub trait TlsProber: Send + Sync {
    async fn handshake(
        &self,
        host: &str,
        port: u16,
        version: TlsVersion,
        timeout: Duration,
    ) -> Result<TlsAttempt, ProbeError>;
}

/// What happened when the target was approached over plaintext HTTP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaintextAccess {
    /// No usable plaintext response (connection refused, reset, or error
    /// status) - the passing finding
    Blocked { detail: String },
    /// Plaintext answered with a redirect to an HTTPS location
    RedirectsToHttps { location: String },
    /// Plaintext served content without redirecting to HTTPS
    Open { status: u16 },
}

/// Raw findings of the transport probe
#[derive(Debug, Clone)]
pub struct TransportFindings {
    pub plaintext: PlaintextAccess,
    pub tls: BTreeMap<TlsVersion, TlsAttempt>,
}

impl TransportFindings {
    pub fn accepts(&self, version: TlsVersion) -> bool {
        self.tls.get(&version).map(TlsAttempt::accepted).unwrap_or(false)
    }
}

/// The transport probe
pub struct TransportProbe {
    fetcher: Arc<dyn Fetcher>,
    tls: Arc<dyn TlsProber>,
    handshake_timeout: Duration,
}

impl TransportProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>, tls: Arc<dyn TlsProber>, handshake_timeout: Duration) -> Self {
        Self {
            fetcher,
            tls,
            handshake_timeout,
        }
    }

    pub async fn probe(&self, target: &Target) -> Result<TransportFindings, ProbeError> {
        let parsed = url::Url::parse(&target.url)
            .map_err(|e| ProbeError::parse_failure(format!("invalid target URL: {}", e)))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| ProbeError::parse_failure("target URL has no host"))?
            .to_string();
        let port = parsed.port().unwrap_or(443);

        let plaintext = self.test_plaintext(&parsed).await;

        // An unreachable host surfaces as a connect error from the prober,
        // which propagates here; a refused handshake comes back as a
        // finding.
        let mut tls = BTreeMap::new();
        for &version in TlsVersion::ALL {
            let attempt = self
                .tls
                .handshake(&host, port, version, self.handshake_timeout)
                .await?;
            tls.insert(version, attempt);
        }

        Ok(TransportFindings { plaintext, tls })
    }

    /// A plaintext request that fails to connect is the passing finding, not
    /// a probe error.
    async fn test_plaintext(&self, https_url: &url::Url) -> PlaintextAccess {
        let mut http_url = https_url.clone();
        if http_url.set_scheme("http").is_err() {
            return PlaintextAccess::Blocked {
                detail: "URL not convertible to http".to_string(),
            };
        }
        http_url.set_path("/");
        http_url.set_query(None);

        match self.fetcher.fetch(http_url.as_str(), RedirectMode::Stop).await {
            Ok(response) if response.is_redirect() => {
                // Location may be relative; resolve against the request URL
                // before deciding whether the redirect reaches HTTPS.
                let location = response.header("location").unwrap_or("");
                match http_url.join(location) {
                    Ok(resolved) if resolved.scheme() == "https" => {
                        PlaintextAccess::RedirectsToHttps {
                            location: resolved.to_string(),
                        }
                    }
                    _ => PlaintextAccess::Open {
                        status: response.status,
                    },
                }
            }
            Ok(response) if response.status < 400 => PlaintextAccess::Open {
                status: response.status,
            },
            Ok(response) => PlaintextAccess::Blocked {
                detail: format!("plaintext rejected with status {}", response.status),
            },
            Err(err) => PlaintextAccess::Blocked {
                detail: format!("plaintext connection failed: {}", err),
            },
        }
    }
}

/// Production TLS prober
pub struct RustlsProber;

impl RustlsProber {
    fn modern_config(version: TlsVersion) -> Arc<rustls::ClientConfig> {
        let protocol = match version {
            TlsVersion::Tls12 => &rustls::version::TLS12,
            _ => &rustls::version::TLS13,
        };

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_protocol_versions(&[protocol])
            .with_root_certificates(roots)
            .with_no_client_auth();

        Arc::new(config)
    }

    /// The version was negotiated if the handshake got past ServerHello; a
    /// certificate problem after that point still proves version support.
    fn classify_handshake_error(version: TlsVersion, err: &std::io::Error) -> TlsAttempt {
        if let Some(inner) = err.get_ref() {
            if let Some(tls_err) = inner.downcast_ref::<rustls::Error>() {
                return match tls_err {
                    rustls::Error::InvalidCertificate(reason) => TlsAttempt::Accepted {
                        detail: format!(
                            "{} negotiated (untrusted certificate: {:?})",
                            version.as_str(),
                            reason
                        ),
                    },
                    other => TlsAttempt::Refused {
                        reason: format!("{}", other),
                    },
                };
            }
        }

        TlsAttempt::Refused {
            reason: err.to_string(),
        }
    }

    async fn modern_handshake(
        &self,
        host: &str,
        port: u16,
        version: TlsVersion,
        timeout: Duration,
    ) -> Result<TlsAttempt, ProbeError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProbeError::timeout(format!("connect to {}:{} timed out", host, port)))?
            .map_err(|e| ProbeError::network(format!("connect to {}:{} failed: {}", host, port, e)))?;

        let connector = tokio_rustls::TlsConnector::from(Self::modern_config(version));
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| ProbeError::parse_failure(format!("invalid server name: {}", e)))?;

        match tokio::time::timeout(timeout, connector.connect(server_name, stream)).await {
            Ok(Ok(tls_stream)) => {
                let (_, session) = tls_stream.get_ref();
                let negotiated = session
                    .protocol_version()
                    .map(|v| format!("{:?}", v))
                    .unwrap_or_else(|| version.as_str().to_string());
                Ok(TlsAttempt::Accepted { detail: negotiated })
            }
            Ok(Err(err)) => Ok(Self::classify_handshake_error(version, &err)),
            Err(_) => Err(ProbeError::timeout(format!(
                "{} handshake with {}:{} timed out",
                version.as_str(),
                host,
                port
            ))),
        }
    }

    /// Minimal ClientHello for a legacy protocol version, SNI included.
    fn legacy_client_hello(host: &str, version: TlsVersion) -> Vec<u8> {
        // Classic cipher suites a TLS 1.0/1.1 server would recognize
        const SUITES: &[u16] = &[
            0xc013, // ECDHE_RSA_WITH_AES_128_CBC_SHA
            0xc014, // ECDHE_RSA_WITH_AES_256_CBC_SHA
            0x002f, // RSA_WITH_AES_128_CBC_SHA
            0x0035, // RSA_WITH_AES_256_CBC_SHA
            0x000a, // RSA_WITH_3DES_EDE_CBC_SHA
        ];

        let mut random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random);

        let wire = version.wire_bytes();

        // server_name extension
        let host_bytes = host.as_bytes();
        let mut sni = Vec::new();
        sni.extend_from_slice(&[0x00, 0x00]); // extension type: server_name
        let name_list_len = host_bytes.len() + 3;
        sni.extend_from_slice(&((name_list_len + 2) as u16).to_be_bytes());
        sni.extend_from_slice(&(name_list_len as u16).to_be_bytes());
        sni.push(0x00); // name type: host_name
        sni.extend_from_slice(&(host_bytes.len() as u16).to_be_bytes());
        sni.extend_from_slice(host_bytes);

        let mut body = Vec::new();
        body.extend_from_slice(&wire);
        body.extend_from_slice(&random);
        body.push(0x00); // empty session id
        body.extend_from_slice(&((SUITES.len() * 2) as u16).to_be_bytes());
        for suite in SUITES {
            body.extend_from_slice(&suite.to_be_bytes());
        }
        body.extend_from_slice(&[0x01, 0x00]); // null compression only
        body.extend_from_slice(&(sni.len() as u16).to_be_bytes());
        body.extend_from_slice(&sni);

        let mut handshake = Vec::new();
        handshake.push(0x01); // client_hello
        let len = (body.len() as u32).to_be_bytes();
        handshake.extend_from_slice(&len[1..4]);
        handshake.extend_from_slice(&body);

        let mut record = Vec::new();
        record.push(0x16); // handshake record
        record.extend_from_slice(&wire);
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    async fn legacy_handshake(
        &self,
        host: &str,
        port: u16,
        version: TlsVersion,
        timeout: Duration,
    ) -> Result<TlsAttempt, ProbeError> {
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProbeError::timeout(format!("connect to {}:{} timed out", host, port)))?
            .map_err(|e| ProbeError::network(format!("connect to {}:{} failed: {}", host, port, e)))?;

        let hello = Self::legacy_client_hello(host, version);
        stream
            .write_all(&hello)
            .await
            .map_err(|e| ProbeError::network(format!("failed to send ClientHello: {}", e)))?;

        let mut header = [0u8; 5];
        let read = tokio::time::timeout(timeout, stream.read_exact(&mut header)).await;

        let attempt = match read {
            // Clean close before any record: the server wants nothing to do
            // with this protocol version.
            Ok(Err(_)) => TlsAttempt::Refused {
                reason: "connection closed before ServerHello".to_string(),
            },
            Err(_) => {
                return Err(ProbeError::timeout(format!(
                    "{} handshake with {}:{} timed out",
                    version.as_str(),
                    host,
                    port
                )))
            }
            Ok(Ok(_)) => match header[0] {
                // alert record
                0x15 => TlsAttempt::Refused {
                    reason: "handshake alert received".to_string(),
                },
                // handshake record: expect ServerHello and confirm the
                // server_version actually matches what we asked for
                0x16 => {
                    let mut body = vec![0u8; (u16::from_be_bytes([header[3], header[4]]) as usize).min(4096)];
                    match tokio::time::timeout(timeout, stream.read_exact(&mut body)).await {
                        Ok(Ok(_)) if body.len() >= 6 && body[0] == 0x02 => {
                            let negotiated = [body[4], body[5]];
                            if negotiated == version.wire_bytes() {
                                TlsAttempt::Accepted {
                                    detail: format!("{} ServerHello received", version.as_str()),
                                }
                            } else {
                                TlsAttempt::Refused {
                                    reason: format!(
                                        "server negotiated {:02x}{:02x} instead of {}",
                                        negotiated[0],
                                        negotiated[1],
                                        version.as_str()
                                    ),
                                }
                            }
                        }
                        Ok(Ok(_)) => TlsAttempt::Refused {
                            reason: "unexpected handshake message".to_string(),
                        },
                        Ok(Err(_)) => TlsAttempt::Refused {
                            reason: "connection closed mid-handshake".to_string(),
                        },
                        Err(_) => {
                            return Err(ProbeError::timeout(format!(
                                "{} handshake with {}:{} timed out",
                                version.as_str(),
                                host,
                                port
                            )))
                        }
                    }
                }
                other => TlsAttempt::Refused {
                    reason: format!("unexpected record type 0x{:02x}", other),
                },
            },
        };

        Ok(attempt)
    }
}

#[async_trait]
impl TlsProber for RustlsProber {
    async fn handshake(
        &self,
        host: &str,
        port: u16,
        version: TlsVersion,
        timeout: Duration,
    ) -> Result<TlsAttempt, ProbeError> {
        match version {
            TlsVersion::Tls12 | TlsVersion::Tls13 => {
                self.modern_handshake(host, port, version, timeout).await
            }
            TlsVersion::Tls10 | TlsVersion::Tls11 => {
                self.legacy_handshake(host, port, version, timeout).await
            }
        }
    }
}

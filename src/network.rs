use std::{str::FromStr, sync::Once};

use lazy_static::lazy_static;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Uri};

use crate::error::{BuilderError, TransportError};

lazy_static! {
    static ref CRYPTO_PROVIDER: Once = Once::new();
}

/// Installs the ring provider as the process-wide rustls default. tonic needs
/// one before the first TLS handshake.
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Another component may have installed a provider already.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Connection settings of a single peer or orderer node.
#[derive(Debug, Clone)]
pub struct Connection {
    host: Uri,
    tls_config: Option<ClientTlsConfig>,
}

impl Connection {
    pub fn uri(&self) -> &Uri {
        &self.host
    }

    pub fn authority(&self) -> String {
        self.host
            .authority()
            .map(|authority| authority.to_string())
            .unwrap_or_default()
    }

    pub async fn connect(&self) -> Result<Channel, TransportError> {
        let mut endpoint = Channel::builder(self.host.clone());
        if let Some(tls_config) = &self.tls_config {
            install_crypto_provider();
            endpoint = endpoint
                .tls_config(tls_config.clone())
                .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        }
        let channel = endpoint
            .connect()
            .await
            .map_err(|err| TransportError::Unavailable(format!("{}: {err}", self.host)))?;
        tracing::debug!(host = %self.host, "connected");
        Ok(channel)
    }
}

/// The `ConnectionBuilder` configures the gRPC connection to a node: scheme,
/// authority and the TLS CA certificate.
///
/// # Examples
///
/// ```rust,ignore
///  use fabric_txflow::network::ConnectionBuilder;
///
///  let channel = ConnectionBuilder::new()
///    .with_tls(std::fs::read(tlsca_path)?)?
///    .with_scheme("https")?
///    .with_authority("localhost:7051")?
///    .build()?
///    .connect()
///    .await?;
/// ```
#[derive(Default)]
pub struct ConnectionBuilder {
    tls: Option<Vec<u8>>,
    scheme: Option<String>,
    authority: Option<String>,
}

impl ConnectionBuilder {
    pub fn new() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Chooses which scheme is being used. Default value is `https`
    pub fn with_scheme(
        mut self,
        scheme: impl Into<String>,
    ) -> Result<ConnectionBuilder, BuilderError> {
        let scheme = scheme.into().trim().to_string();
        if scheme.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "scheme cannot be empty".into(),
            ));
        }
        self.scheme = Some(scheme);
        Ok(self)
    }

    /// PEM of the CA that signed the node's TLS certificate, e.g.
    /// `organizations/peerOrganizations/org1.example.com/tlsca/tlsca.org1.example.com-cert.pem`
    pub fn with_tls(mut self, bytes: impl Into<Vec<u8>>) -> Result<ConnectionBuilder, BuilderError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(BuilderError::InvalidParameter("tls cannot be empty".into()));
        }
        self.tls = Some(bytes);
        Ok(self)
    }

    /// Default is `localhost:7051` which corresponds to the first peer of the test network
    pub fn with_authority(
        mut self,
        authority: impl Into<String>,
    ) -> Result<ConnectionBuilder, BuilderError> {
        let authority = authority.into().trim().to_string();
        if authority.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "authority cannot be empty".into(),
            ));
        }
        self.authority = Some(authority);
        Ok(self)
    }

    /// Validates the settings. Building does not open the connection.
    pub fn build(self) -> Result<Connection, BuilderError> {
        let scheme = match self.scheme {
            Some(scheme) => scheme,
            None => "https".to_string(),
        };
        let authority = match self.authority {
            Some(authority) => authority,
            None => "localhost:7051".to_string(),
        };
        let tls_config = match (scheme.as_str(), self.tls) {
            ("https", Some(tls)) => Some(
                ClientTlsConfig::new().ca_certificate(Certificate::from_pem(tls.as_slice())),
            ),
            ("https", None) => return Err(BuilderError::MissingParameter("tls".into())),
            (_, _) => None,
        };
        let scheme = tonic::codegen::http::uri::Scheme::from_str(scheme.as_str())
            .map_err(|err| BuilderError::InvalidParameter(err.to_string()))?;
        let uri_builder = Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query("/");
        let host = match uri_builder.build() {
            Ok(uri) => uri,
            Err(err) => return Err(BuilderError::InvalidParameter(err.to_string())),
        };
        Ok(Connection { host, tls_config })
    }
}

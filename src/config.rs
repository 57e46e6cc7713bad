use std::time::Duration;

use crate::{error::BuilderError, transaction::ChaincodeType, transport::Peer};

pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_INSTANTIATE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CHAINCODE_VERSION: &str = "1.0";

/// Settings of a coordinator bound to one channel and chaincode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub channel_name: String,
    pub chaincode_id: String,
    pub chaincode_version: String,
    pub chaincode_type: ChaincodeType,
    pub targets: Vec<Peer>,
    /// Deadline for the commit event of a plain transaction.
    pub invoke_timeout: Duration,
    /// Deadline for the commit event of an instantiate, which starts a
    /// chaincode container and is much slower.
    pub instantiate_timeout: Duration,
    /// Bound on every single endorsement call. Unbounded when `None`.
    pub endorsement_timeout: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Reads the configuration from `FABRIC_*` environment variables.
    ///
    /// `FABRIC_CHANNEL`, `FABRIC_CHAINCODE` and `FABRIC_PEERS` (comma separated)
    /// are required; `FABRIC_CHAINCODE_VERSION`, `FABRIC_INVOKE_TIMEOUT_MS`,
    /// `FABRIC_INSTANTIATE_TIMEOUT_MS` and `FABRIC_ENDORSEMENT_TIMEOUT_MS` are optional.
    pub fn from_env() -> Result<CoordinatorConfig, BuilderError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<CoordinatorConfig, BuilderError> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| BuilderError::MissingParameter(key.to_string()))
        };
        let millis = |key: &str| -> Result<Option<Duration>, BuilderError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(|ms| Some(Duration::from_millis(ms)))
                    .map_err(|err| BuilderError::InvalidParameter(format!("{key}: {err}"))),
                None => Ok(None),
            }
        };

        let peers = required("FABRIC_PEERS")?
            .split(',')
            .map(str::trim)
            .filter(|peer| !peer.is_empty())
            .map(Peer::new)
            .collect::<Vec<Peer>>();

        let mut builder = CoordinatorConfig::builder()
            .with_channel_name(required("FABRIC_CHANNEL")?)?
            .with_chaincode_id(required("FABRIC_CHAINCODE")?)?
            .with_targets(peers)?;
        if let Some(version) = lookup("FABRIC_CHAINCODE_VERSION") {
            builder = builder.with_chaincode_version(version)?;
        }
        if let Some(timeout) = millis("FABRIC_INVOKE_TIMEOUT_MS")? {
            builder = builder.with_invoke_timeout(timeout)?;
        }
        if let Some(timeout) = millis("FABRIC_INSTANTIATE_TIMEOUT_MS")? {
            builder = builder.with_instantiate_timeout(timeout)?;
        }
        if let Some(timeout) = millis("FABRIC_ENDORSEMENT_TIMEOUT_MS")? {
            builder = builder.with_endorsement_timeout(timeout)?;
        }
        builder.build()
    }
}

#[derive(Default)]
pub struct CoordinatorConfigBuilder {
    channel_name: Option<String>,
    chaincode_id: Option<String>,
    chaincode_version: Option<String>,
    chaincode_type: ChaincodeType,
    targets: Vec<Peer>,
    invoke_timeout: Option<Duration>,
    instantiate_timeout: Option<Duration>,
    endorsement_timeout: Option<Duration>,
}

impl CoordinatorConfigBuilder {
    pub fn with_channel_name(
        mut self,
        name: impl Into<String>,
    ) -> Result<CoordinatorConfigBuilder, BuilderError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "channel name cannot be empty".into(),
            ));
        }
        self.channel_name = Some(name);
        Ok(self)
    }

    pub fn with_chaincode_id(
        mut self,
        id: impl Into<String>,
    ) -> Result<CoordinatorConfigBuilder, BuilderError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(BuilderError::InvalidParameter("id cannot be empty".into()));
        }
        self.chaincode_id = Some(id);
        Ok(self)
    }

    pub fn with_chaincode_version(
        mut self,
        version: impl Into<String>,
    ) -> Result<CoordinatorConfigBuilder, BuilderError> {
        let version = version.into().trim().to_string();
        if version.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "version cannot be empty".into(),
            ));
        }
        self.chaincode_version = Some(version);
        Ok(self)
    }

    pub fn with_chaincode_type(mut self, chaincode_type: ChaincodeType) -> CoordinatorConfigBuilder {
        self.chaincode_type = chaincode_type;
        self
    }

    pub fn with_targets(
        mut self,
        targets: Vec<Peer>,
    ) -> Result<CoordinatorConfigBuilder, BuilderError> {
        if targets.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "targets cannot be empty".into(),
            ));
        }
        self.targets = targets;
        Ok(self)
    }

    pub fn with_invoke_timeout(
        mut self,
        timeout: Duration,
    ) -> Result<CoordinatorConfigBuilder, BuilderError> {
        self.invoke_timeout = Some(non_zero("invoke_timeout", timeout)?);
        Ok(self)
    }

    pub fn with_instantiate_timeout(
        mut self,
        timeout: Duration,
    ) -> Result<CoordinatorConfigBuilder, BuilderError> {
        self.instantiate_timeout = Some(non_zero("instantiate_timeout", timeout)?);
        Ok(self)
    }

    pub fn with_endorsement_timeout(
        mut self,
        timeout: Duration,
    ) -> Result<CoordinatorConfigBuilder, BuilderError> {
        self.endorsement_timeout = Some(non_zero("endorsement_timeout", timeout)?);
        Ok(self)
    }

    pub fn build(self) -> Result<CoordinatorConfig, BuilderError> {
        let channel_name = match self.channel_name {
            Some(channel_name) => channel_name,
            None => return Err(BuilderError::MissingParameter("channel_name".into())),
        };
        let chaincode_id = match self.chaincode_id {
            Some(chaincode_id) => chaincode_id,
            None => return Err(BuilderError::MissingParameter("chaincode_id".into())),
        };
        if self.targets.is_empty() {
            return Err(BuilderError::MissingParameter("targets".into()));
        }
        Ok(CoordinatorConfig {
            channel_name,
            chaincode_id,
            chaincode_version: self
                .chaincode_version
                .unwrap_or_else(|| DEFAULT_CHAINCODE_VERSION.to_string()),
            chaincode_type: self.chaincode_type,
            targets: self.targets,
            invoke_timeout: self.invoke_timeout.unwrap_or(DEFAULT_INVOKE_TIMEOUT),
            instantiate_timeout: self
                .instantiate_timeout
                .unwrap_or(DEFAULT_INSTANTIATE_TIMEOUT),
            endorsement_timeout: self.endorsement_timeout,
        })
    }
}

fn non_zero(name: &str, timeout: Duration) -> Result<Duration, BuilderError> {
    if timeout.is_zero() {
        return Err(BuilderError::InvalidParameter(format!(
            "{name} cannot be zero"
        )));
    }
    Ok(timeout)
}

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use prost::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::{
    error::{BuilderError, EnrollError, IdentityError},
    protos::msp::SerializedIdentity,
    signer::Signer,
    store::IdentityStore,
};

/// An enrolled signing identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    principal: String,
    msp_id: String,
    /// PKCS#8 PEM private key.
    private_key: String,
    /// PEM certificate signed by the CA.
    certificate: String,
}

impl Identity {
    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    pub fn signer(&self) -> Signer {
        Signer::new(self.private_key.as_bytes())
    }

    /// The creator bytes carried in every signature header.
    pub fn serialize(&self) -> Vec<u8> {
        SerializedIdentity {
            mspid: self.msp_id.clone(),
            id_bytes: self.certificate.clone().into_bytes(),
        }
        .encode_to_vec()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal)
            .field("msp_id", &self.msp_id)
            .finish_non_exhaustive()
    }
}

pub struct IdentityBuilder {
    principal: Option<String>,
    msp: Option<String>,
    private_key: Option<String>,
    cert: String,
}

impl IdentityBuilder {
    pub fn from_pem(pem: impl Into<String>) -> IdentityBuilder {
        IdentityBuilder {
            principal: None,
            msp: None,
            private_key: None,
            cert: pem.into(),
        }
    }

    pub fn with_principal(
        mut self,
        principal: impl Into<String>,
    ) -> Result<IdentityBuilder, BuilderError> {
        let principal = principal.into().trim().to_string();
        if principal.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "principal cannot be empty".into(),
            ));
        }
        self.principal = Some(principal);
        Ok(self)
    }

    pub fn with_msp(mut self, msp: impl Into<String>) -> Result<IdentityBuilder, BuilderError> {
        let msp = msp.into().trim().to_string();
        if msp.is_empty() {
            return Err(BuilderError::InvalidParameter("msp cannot be empty".into()));
        }
        self.msp = Some(msp);
        Ok(self)
    }

    pub fn with_private_key(
        mut self,
        pem: impl Into<String>,
    ) -> Result<IdentityBuilder, BuilderError> {
        let pem = pem.into();
        if pem.trim().is_empty() {
            return Err(BuilderError::InvalidParameter(
                "private key cannot be empty".into(),
            ));
        }
        self.private_key = Some(pem);
        Ok(self)
    }

    pub fn build(self) -> Result<Identity, BuilderError> {
        let principal = match self.principal {
            Some(principal) => principal,
            None => return Err(BuilderError::MissingParameter("principal".into())),
        };
        let msp_id = match self.msp {
            Some(msp) => msp,
            None => return Err(BuilderError::MissingParameter("msp".into())),
        };
        let private_key = match self.private_key {
            Some(private_key) => private_key,
            None => return Err(BuilderError::MissingParameter("private_key".into())),
        };
        if self.cert.trim().is_empty() {
            return Err(BuilderError::MissingParameter("certificate".into()));
        }
        Ok(Identity {
            principal,
            msp_id,
            private_key,
            certificate: self.cert,
        })
    }
}

/// Key and certificate handed out by a certificate authority.
#[derive(Clone)]
pub struct Enrollment {
    pub private_key: String,
    pub certificate: String,
}

/// Certificate authority enrollment.
#[async_trait]
pub trait Enroller: Send + Sync {
    async fn enroll(&self, principal: &str, secret: &str) -> Result<Enrollment, EnrollError>;
}

/// Supplies signing identities, enrolling against the CA only for principals
/// that are neither cached nor stored.
pub struct IdentityProvider {
    msp_id: String,
    store: Arc<dyn IdentityStore>,
    enroller: Arc<dyn Enroller>,
    cache: RwLock<HashMap<String, Arc<Identity>>>,
    /// One enrollment lock per principal.
    enrolling: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityProvider {
    pub fn new(
        msp_id: impl Into<String>,
        store: Arc<dyn IdentityStore>,
        enroller: Arc<dyn Enroller>,
    ) -> Self {
        Self {
            msp_id: msp_id.into(),
            store,
            enroller,
            cache: RwLock::new(HashMap::new()),
            enrolling: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_identity(
        &self,
        principal: &str,
        secret: &str,
    ) -> Result<Arc<Identity>, IdentityError> {
        if let Some(identity) = self.cache.read().await.get(principal) {
            return Ok(identity.clone());
        }

        // Two callers never enroll the same principal twice. Other principals proceed.
        let lock = self
            .enrolling
            .lock()
            .entry(principal.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;
        if let Some(identity) = self.cache.read().await.get(principal) {
            return Ok(identity.clone());
        }

        let identity = match self.store.get(principal).await? {
            Some(identity) => {
                tracing::debug!(principal, "loaded identity from store");
                identity
            }
            None => {
                tracing::info!(principal, msp_id = %self.msp_id, "enrolling identity");
                let enrollment = self.enroller.enroll(principal, secret).await.map_err(
                    |source| IdentityError::EnrollmentFailed {
                        principal: principal.to_string(),
                        source,
                    },
                )?;
                let identity = IdentityBuilder::from_pem(enrollment.certificate)
                    .with_principal(principal)?
                    .with_msp(self.msp_id.clone())?
                    .with_private_key(enrollment.private_key)?
                    .build()?;
                self.store.put(&identity).await?;
                identity
            }
        };

        let identity = Arc::new(identity);
        self.cache
            .write()
            .await
            .insert(principal.to_string(), identity.clone());
        Ok(identity)
    }
}

use std::{collections::HashMap, sync::Arc};

use prost::Message;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{
    endorsement::EndorsementResponse,
    error::{BuilderError, SignError},
    identity::Identity,
    protos::{
        common::{ChannelHeader, Envelope, Header, HeaderType, Payload, SignatureHeader},
        peer::{
            ChaincodeActionPayload, ChaincodeDeploymentSpec, ChaincodeEndorsedAction,
            ChaincodeHeaderExtension, ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec,
            ChaincodeProposalPayload, ChaincodeSpec, Endorsement, SignedProposal, Transaction,
            TransactionAction, chaincode_spec,
        },
    },
    transport::Peer,
};

pub(crate) const NONCE_LENGTH: usize = 24;

/// Name of the lifecycle system chaincode that handles install and deploy.
pub(crate) const LIFECYCLE_CHAINCODE: &str = "lscc";

const DEFAULT_CHAINCODE_VERSION: &str = "1.0";

/// Identifier correlating a proposal, its endorsements, the ordering submission
/// and the commit event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(String);

impl TransactionId {
    /// Derives the id from a nonce and the serialized creator identity.
    /// Anyone holding both gets the same id.
    pub fn derive(nonce: &[u8], creator: &[u8]) -> TransactionId {
        TransactionId(create_transaction_id(nonce, creator))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        TransactionId(value.to_string())
    }
}

/// Chaincode language, as understood by the peer when it builds the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChaincodeType {
    #[default]
    Golang,
    Node,
    Car,
    Java,
}

impl From<ChaincodeType> for chaincode_spec::Type {
    fn from(value: ChaincodeType) -> Self {
        match value {
            ChaincodeType::Golang => chaincode_spec::Type::Golang,
            ChaincodeType::Node => chaincode_spec::Type::Node,
            ChaincodeType::Car => chaincode_spec::Type::Car,
            ChaincodeType::Java => chaincode_spec::Type::Java,
        }
    }
}

/// What the proposal asks the endorsers to do.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProposalKind {
    /// Invoke or query a chaincode function.
    #[default]
    Invoke,
    /// Deploy the chaincode on the channel and run its init function.
    Instantiate,
    /// Install a chaincode package on the target peers. An empty package is
    /// the local development mode where the chaincode runs outside the peer.
    Install { code_package: Vec<u8> },
}

/// A signed, unsubmitted transaction request.
#[derive(Debug, Clone)]
pub struct Proposal {
    transaction_id: TransactionId,
    nonce: Vec<u8>,
    channel_name: String,
    chaincode_id: String,
    chaincode_version: String,
    function_name: String,
    function_args: Vec<Vec<u8>>,
    targets: Vec<Peer>,
    kind: ProposalKind,
    header: Header,
    payload: Vec<u8>,
    signed_proposal: SignedProposal,
    creator: Arc<Identity>,
}

impl Proposal {
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn chaincode_id(&self) -> &str {
        &self.chaincode_id
    }

    pub fn chaincode_version(&self) -> &str {
        &self.chaincode_version
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn function_args(&self) -> &[Vec<u8>] {
        &self.function_args
    }

    pub fn targets(&self) -> &[Peer] {
        &self.targets
    }

    pub fn kind(&self) -> &ProposalKind {
        &self.kind
    }

    pub fn creator(&self) -> &Identity {
        &self.creator
    }

    /// Encoded proposal header.
    pub fn header(&self) -> Vec<u8> {
        self.header.encode_to_vec()
    }

    pub(crate) fn signed_proposal(&self) -> &SignedProposal {
        &self.signed_proposal
    }

    /// Bytes sent to the endorsing peers.
    pub fn signed_proposal_bytes(&self) -> Vec<u8> {
        self.signed_proposal.encode_to_vec()
    }
}

/// A proposal together with the unanimous set of endorsements it collected.
#[derive(Debug, Clone)]
pub struct EndorsedTransaction {
    proposal: Proposal,
    responses: Vec<EndorsementResponse>,
}

impl EndorsedTransaction {
    pub(crate) fn new(proposal: Proposal, responses: Vec<EndorsementResponse>) -> Self {
        Self {
            proposal,
            responses,
        }
    }

    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    pub fn responses(&self) -> &[EndorsementResponse] {
        &self.responses
    }

    pub fn transaction_id(&self) -> &TransactionId {
        self.proposal.transaction_id()
    }

    pub fn header(&self) -> Vec<u8> {
        self.proposal.header()
    }

    /// Chaincode result of the first endorsement.
    pub fn result(&self) -> Vec<u8> {
        self.responses
            .first()
            .and_then(|response| response.payload.clone())
            .unwrap_or_default()
    }

    /// Assembles the transaction envelope for the ordering service, signed by
    /// the proposal creator.
    pub fn to_envelope(&self) -> Result<Envelope, SignError> {
        let proposal_response_payload = self
            .responses
            .first()
            .map(|response| response.response_payload.clone())
            .unwrap_or_default();
        let endorsements = self
            .responses
            .iter()
            .filter_map(|response| response.endorsement.as_ref())
            .map(|endorsement| Endorsement {
                endorser: endorsement.endorser.clone(),
                signature: endorsement.signature.clone(),
            })
            .collect::<Vec<Endorsement>>();

        let action_payload = ChaincodeActionPayload {
            chaincode_proposal_payload: self.proposal.payload.clone(),
            action: Some(ChaincodeEndorsedAction {
                proposal_response_payload,
                endorsements,
            }),
        };
        let transaction = Transaction {
            actions: vec![TransactionAction {
                header: self.proposal.header.signature_header.clone(),
                payload: action_payload.encode_to_vec(),
            }],
        };
        let payload = Payload {
            header: Some(self.proposal.header.clone()),
            data: transaction.encode_to_vec(),
        }
        .encode_to_vec();
        let signature = self.proposal.creator.signer().sign_message(&payload)?;
        Ok(Envelope { payload, signature })
    }
}

/// A builder for creating `Proposal` instances.
/// build() only prepares and signs the proposal. It will not send anything to the network.
///
/// # Examples
///
/// ```rust,ignore
///  let proposal = ProposalBuilder::new(identity)
///    .with_channel_name("mychannel")?
///    .with_chaincode_id("mycc")?
///    .with_targets(vec![Peer::new("localhost:7051")])?
///    .with_function_name("org.hyperledger.chaincode.example02/fcn/1")?
///    .with_function_args(vec![payment_params])?
///    .build()?;
/// ```
pub struct ProposalBuilder {
    identity: Arc<Identity>,
    channel_name: Option<String>,
    chaincode_id: Option<String>,
    chaincode_version: Option<String>,
    chaincode_type: ChaincodeType,
    targets: Vec<Peer>,
    function_name: Option<String>,
    function_args: Vec<Vec<u8>>,
    kind: ProposalKind,
}

impl ProposalBuilder {
    pub fn new(identity: Arc<Identity>) -> ProposalBuilder {
        ProposalBuilder {
            identity,
            channel_name: None,
            chaincode_id: None,
            chaincode_version: None,
            chaincode_type: ChaincodeType::default(),
            targets: vec![],
            function_name: None,
            function_args: vec![],
            kind: ProposalKind::default(),
        }
    }

    pub fn with_channel_name(
        mut self,
        name: impl Into<String>,
    ) -> Result<ProposalBuilder, BuilderError> {
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
    ) -> Result<ProposalBuilder, BuilderError> {
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
    ) -> Result<ProposalBuilder, BuilderError> {
        let version = version.into().trim().to_string();
        if version.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "version cannot be empty".into(),
            ));
        }
        self.chaincode_version = Some(version);
        Ok(self)
    }

    pub fn with_chaincode_type(mut self, chaincode_type: ChaincodeType) -> ProposalBuilder {
        self.chaincode_type = chaincode_type;
        self
    }

    pub fn with_targets(mut self, targets: Vec<Peer>) -> Result<ProposalBuilder, BuilderError> {
        if targets.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "targets cannot be empty".into(),
            ));
        }
        self.targets = targets;
        Ok(self)
    }

    pub fn with_function_name(
        mut self,
        name: impl Into<String>,
    ) -> Result<ProposalBuilder, BuilderError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(BuilderError::InvalidParameter(
                "function name cannot be empty".into(),
            ));
        }
        self.function_name = Some(name);
        Ok(self)
    }

    pub fn with_function_args(
        mut self,
        args: Vec<Vec<u8>>,
    ) -> Result<ProposalBuilder, BuilderError> {
        self.function_args = args;
        Ok(self)
    }

    pub fn with_kind(mut self, kind: ProposalKind) -> ProposalBuilder {
        self.kind = kind;
        self
    }

    pub fn build(self) -> Result<Proposal, BuilderError> {
        let chaincode_id = match self.chaincode_id {
            Some(chaincode_id) => chaincode_id,
            None => return Err(BuilderError::MissingParameter("chaincode_id".into())),
        };
        let function_name = match self.function_name {
            Some(function_name) => function_name,
            None => return Err(BuilderError::MissingParameter("function_name".into())),
        };
        if self.targets.is_empty() {
            return Err(BuilderError::MissingParameter("targets".into()));
        }
        // Install is not bound to a channel.
        let channel_name = match (self.channel_name, &self.kind) {
            (_, ProposalKind::Install { .. }) => String::new(),
            (Some(channel_name), _) => channel_name,
            (None, _) => return Err(BuilderError::MissingParameter("channel_name".into())),
        };
        let chaincode_version = self
            .chaincode_version
            .unwrap_or_else(|| DEFAULT_CHAINCODE_VERSION.to_string());

        let creator = self.identity.serialize();
        let nonce = generate_nonce();
        let transaction_id = TransactionId::derive(&nonce, &creator);

        let target_chaincode = ChaincodeId {
            path: String::default(),
            name: chaincode_id.clone(),
            version: chaincode_version.clone(),
        };
        let mut input_args = Vec::with_capacity(self.function_args.len() + 1);
        input_args.push(function_name.as_bytes().to_vec());
        input_args.extend(self.function_args.iter().cloned());
        let target_spec = ChaincodeSpec {
            r#type: chaincode_spec::Type::from(self.chaincode_type).into(),
            chaincode_id: Some(target_chaincode),
            input: Some(ChaincodeInput {
                args: input_args,
                decorations: HashMap::default(),
                is_init: false,
            }),
            timeout: 0,
        };

        // Lifecycle operations are invocations of the lifecycle system chaincode
        // that carry a deployment spec of the target chaincode.
        let invoked_spec = match &self.kind {
            ProposalKind::Invoke => target_spec,
            ProposalKind::Instantiate => {
                let deployment = ChaincodeDeploymentSpec {
                    chaincode_spec: Some(target_spec),
                    code_package: vec![],
                };
                lifecycle_spec(vec![
                    b"deploy".to_vec(),
                    channel_name.as_bytes().to_vec(),
                    deployment.encode_to_vec(),
                ])
            }
            ProposalKind::Install { code_package } => {
                let deployment = ChaincodeDeploymentSpec {
                    chaincode_spec: Some(target_spec),
                    code_package: code_package.clone(),
                };
                lifecycle_spec(vec![b"install".to_vec(), deployment.encode_to_vec()])
            }
        };

        let header_extension = ChaincodeHeaderExtension {
            chaincode_id: invoked_spec.chaincode_id.clone(),
        };
        let channel_header = ChannelHeader {
            r#type: HeaderType::EndorserTransaction.into(),
            version: 1,
            timestamp: Some(std::time::SystemTime::now().into()),
            channel_id: channel_name.clone(),
            tx_id: transaction_id.to_string(),
            epoch: 0,
            extension: header_extension.encode_to_vec(),
            tls_cert_hash: vec![],
        };
        let signature_header = SignatureHeader {
            creator,
            nonce: nonce.to_vec(),
        };
        let header = Header {
            channel_header: channel_header.encode_to_vec(),
            signature_header: signature_header.encode_to_vec(),
        };

        let payload = ChaincodeProposalPayload {
            input: ChaincodeInvocationSpec {
                chaincode_spec: Some(invoked_spec),
            }
            .encode_to_vec(),
            transient_map: HashMap::default(),
        }
        .encode_to_vec();

        let proposal = crate::protos::peer::Proposal {
            header: header.encode_to_vec(),
            payload: payload.clone(),
            extension: header_extension.encode_to_vec(),
        };
        let proposal_bytes = proposal.encode_to_vec();
        let signature = self.identity.signer().sign_message(&proposal_bytes)?;

        Ok(Proposal {
            transaction_id,
            nonce: nonce.to_vec(),
            channel_name,
            chaincode_id,
            chaincode_version,
            function_name,
            function_args: self.function_args,
            targets: self.targets,
            kind: self.kind,
            header,
            payload,
            signed_proposal: SignedProposal {
                proposal_bytes,
                signature,
            },
            creator: self.identity,
        })
    }
}

fn lifecycle_spec(args: Vec<Vec<u8>>) -> ChaincodeSpec {
    ChaincodeSpec {
        r#type: chaincode_spec::Type::Golang.into(),
        chaincode_id: Some(ChaincodeId {
            path: String::default(),
            name: LIFECYCLE_CHAINCODE.to_string(),
            version: String::default(),
        }),
        input: Some(ChaincodeInput {
            args,
            decorations: HashMap::default(),
            is_init: false,
        }),
        timeout: 0,
    }
}

pub(crate) fn generate_nonce() -> [u8; NONCE_LENGTH] {
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Creates a unique transaction ID by concatenating a nonce with an identity and then hashing the result.
///
/// # Arguments
/// * `nonce` - A byte slice representing a random nonce.
/// * `creator` - A byte slice representing the identity of the creator in serialized format.
///
/// # Returns
/// A string representing the hashed transaction ID, encoded in hexadecimal format.
pub(crate) fn create_transaction_id(nonce: &[u8], creator: &[u8]) -> String {
    let salted_creator = [nonce, creator].concat();
    hex::encode(Sha256::digest(salted_creator.as_slice()))
}

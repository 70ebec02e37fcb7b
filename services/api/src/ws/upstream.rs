//! Builds and opens the upstream voice connection.
//!
//! [`build_request`] is a pure function of the resolved agent and the static
//! service settings; [`connect`] performs the handshake with the credential
//! attached.

use super::{error::RelayError, forward::MAX_MESSAGE_BYTES, protocol::SESSION_UPDATE};
use crate::config::{VOICE_LIVE_API_VERSION, VoiceLiveSettings};
use rehearsal_core::AgentProfile;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::WebSocketConfig},
};
use tracing::info;
use uuid::Uuid;

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Header carrying the static API credential on the upgrade request.
pub const API_KEY_HEADER: &str = "api-key";

/// Which agent-selection suffix the upstream URL carries. Exactly one is
/// ever appended.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentSelection {
    /// A resolved, upstream-managed agent.
    RemoteAgent { agent_id: String, project: String },
    /// A resolved local agent; its instructions travel in the session config.
    LocalModel { model: String },
    /// No agent resolved, but a default remote agent is configured.
    DefaultAgent { agent_id: String },
    /// No agent resolved and no default agent configured.
    DefaultModel { model: String },
}

impl AgentSelection {
    /// Precedence: agent presence first, then its upstream-managed flag.
    pub fn choose(
        agent: Option<&AgentProfile>,
        settings: &VoiceLiveSettings,
    ) -> Result<Self, RelayError> {
        Ok(match agent {
            Some(agent) if agent.upstream_managed => Self::RemoteAgent {
                agent_id: agent.upstream_id().to_string(),
                project: settings
                    .project_name
                    .clone()
                    .ok_or(RelayError::MissingProjectName)?,
            },
            Some(agent) => Self::LocalModel {
                model: if agent.model.is_empty() {
                    settings.default_model.clone()
                } else {
                    agent.model.clone()
                },
            },
            None => match &settings.default_agent_id {
                Some(agent_id) => Self::DefaultAgent {
                    agent_id: agent_id.clone(),
                },
                None => Self::DefaultModel {
                    model: settings.default_model.clone(),
                },
            },
        })
    }

    fn query_suffix(&self) -> String {
        match self {
            Self::RemoteAgent { agent_id, project } => format!(
                "&agent-id={}&agent-project-name={}",
                urlencoding::encode(agent_id),
                urlencoding::encode(project)
            ),
            Self::LocalModel { model } | Self::DefaultModel { model } => {
                format!("&model={}", urlencoding::encode(model))
            }
            Self::DefaultAgent { agent_id } => {
                format!("&agent-id={}", urlencoding::encode(agent_id))
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session: SessionConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub turn_detection: TypedSetting,
    pub input_audio_noise_reduction: TypedSetting,
    pub input_audio_echo_cancellation: TypedSetting,
    pub avatar: AvatarConfig,
    pub voice: VoiceConfig,
    #[serde(flatten)]
    pub agent: Option<InlineAgent>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TypedSetting {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AvatarConfig {
    pub character: String,
    pub style: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Fields merged into the session config for local agents only.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InlineAgent {
    pub model: String,
    pub instructions: String,
    pub temperature: f32,
    pub max_response_output_tokens: u32,
}

/// Everything needed to open and configure one upstream session.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub url: String,
    pub api_key: String,
    pub selection: AgentSelection,
    pub session_update: SessionUpdate,
}

/// Builds the upstream URL and the initial session configuration.
pub fn build_request(
    agent: Option<&AgentProfile>,
    settings: &VoiceLiveSettings,
) -> Result<UpstreamRequest, RelayError> {
    let api_key = settings
        .api_key
        .clone()
        .ok_or(RelayError::MissingCredential)?;

    let base = match &settings.endpoint_override {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => {
            let resource = settings
                .resource_name
                .as_deref()
                .ok_or(RelayError::MissingResource)?;
            format!("wss://{}.{}", resource, settings.domain)
        }
    };

    let selection = AgentSelection::choose(agent, settings)?;
    let url = format!(
        "{}/{}?api-version={}&x-ms-client-request-id={}{}",
        base,
        settings.path.trim_start_matches('/'),
        VOICE_LIVE_API_VERSION,
        Uuid::new_v4(),
        selection.query_suffix()
    );

    Ok(UpstreamRequest {
        url,
        api_key,
        selection,
        session_update: build_session_update(agent, settings),
    })
}

pub fn build_session_update(
    agent: Option<&AgentProfile>,
    settings: &VoiceLiveSettings,
) -> SessionUpdate {
    let inline = agent
        .filter(|a| !a.upstream_managed)
        .map(|a| InlineAgent {
            model: a.model.clone(),
            instructions: a.instructions.clone(),
            temperature: a.temperature,
            max_response_output_tokens: a.max_tokens,
        });

    SessionUpdate {
        kind: SESSION_UPDATE,
        session: SessionConfig {
            modalities: vec!["text".to_string(), "audio".to_string()],
            turn_detection: TypedSetting {
                kind: settings.turn_detection.clone(),
            },
            input_audio_noise_reduction: TypedSetting {
                kind: settings.noise_reduction.clone(),
            },
            input_audio_echo_cancellation: TypedSetting {
                kind: settings.echo_cancellation.clone(),
            },
            avatar: AvatarConfig {
                character: settings.avatar_character.clone(),
                style: settings.avatar_style.clone(),
            },
            voice: VoiceConfig {
                name: settings.voice_name.clone(),
                kind: settings.voice_type.clone(),
            },
            agent: inline,
        },
    }
}

/// Opens the upstream WebSocket with the credential header attached.
pub async fn connect(request: &UpstreamRequest) -> Result<UpstreamSocket, RelayError> {
    let mut handshake = request
        .url
        .as_str()
        .into_client_request()
        .map_err(RelayError::Connect)?;
    let api_key = HeaderValue::from_str(&request.api_key)
        .map_err(|_| RelayError::Protocol("API key is not a valid header value".to_string()))?;
    handshake.headers_mut().insert(API_KEY_HEADER, api_key);

    let config = WebSocketConfig::default()
        .max_message_size(Some(MAX_MESSAGE_BYTES))
        .max_frame_size(Some(MAX_MESSAGE_BYTES));
    let (socket, response) = connect_async_with_config(handshake, Some(config), false)
        .await
        .map_err(RelayError::Connect)?;
    info!(status = %response.status(), selection = ?request.selection, "Connected to upstream voice service");
    Ok(socket)
}

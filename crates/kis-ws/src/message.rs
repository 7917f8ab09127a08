//! Outbound control frames.

use kis_core::{AccessToken, AppCredentials, StreamKind};
use serde::Serialize;

/// Transaction type: `1` registers a real-time stream.
const TR_TYPE_REGISTER: &str = "1";

/// Customer type: `P` (individual).
const CUSTTYPE_PERSONAL: &str = "P";

/// Real-time registration request.
///
/// Field order is the order KIS documents and is kept on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub header: SubscribeHeader,
    pub body: SubscribeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeHeader {
    pub authorization: String,
    pub appkey: String,
    pub appsecret: String,
    pub tr_type: &'static str,
    pub tr_id: &'static str,
    pub custtype: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeBody {
    pub input: SubscribeInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeInput {
    pub tr_id: &'static str,
    pub tr_key: String,
}

impl SubscribeRequest {
    /// Build a registration request for one stream kind of one symbol.
    pub fn new(
        token: &AccessToken,
        credentials: &AppCredentials,
        kind: StreamKind,
        symbol: &str,
    ) -> Self {
        Self {
            header: SubscribeHeader {
                authorization: format!("Bearer {}", token.value()),
                appkey: credentials.app_key.clone(),
                appsecret: credentials.app_secret.as_str().to_string(),
                tr_type: TR_TYPE_REGISTER,
                tr_id: kind.tr_id(),
                custtype: CUSTTYPE_PERSONAL,
            },
            body: SubscribeBody {
                input: SubscribeInput {
                    tr_id: kind.tr_id(),
                    tr_key: symbol.to_string(),
                },
            },
        }
    }

    pub fn tr_id(&self) -> &'static str {
        self.header.tr_id
    }

    /// Serialize to the text frame sent on the socket.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

//! Remote authentication

/// Credentials attached to every sync request.
#[derive(Clone, Default)]
pub enum RemoteAuth {
    #[default]
    None,
    Bearer(String),
}

impl RemoteAuth {
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => RemoteAuth::Bearer(token),
            _ => RemoteAuth::None,
        }
    }

    pub fn to_header(&self) -> Option<String> {
        match self {
            RemoteAuth::None => None,
            RemoteAuth::Bearer(token) => Some(format!("Bearer {}", token)),
        }
    }
}

impl std::fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteAuth::None => f.write_str("None"),
            RemoteAuth::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

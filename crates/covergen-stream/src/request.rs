use base64::Engine as _;

/// Largest attachment the server accepts, before base64 encoding.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Outbound payload posted to the generation endpoint.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationRequest {
    /// Always `"generate"`.
    pub action: String,
    /// Job description or client brief.
    pub client_text: String,
    /// Reference URLs supplied by the user.
    pub context_snippets: Vec<String>,
    /// Selected category tags.
    pub selected_categories: Vec<String>,
    /// Session the request belongs to.
    pub session_id: uuid::Uuid,
    /// Optional tone hint (for example `Creative`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_mode: Option<String>,
    /// Attached file, standard base64.
    pub base64_string: Option<String>,
    /// Attached file name.
    pub filename: Option<String>,
}

impl GenerationRequest {
    /// Creates a request with only the client text set.
    pub fn new(session_id: uuid::Uuid, client_text: impl Into<String>) -> Self {
        Self {
            action: "generate".to_string(),
            client_text: client_text.into(),
            context_snippets: Vec::new(),
            selected_categories: Vec::new(),
            session_id,
            generation_mode: None,
            base64_string: None,
            filename: None,
        }
    }

    /// Attaches a file, encoding its bytes as base64.
    pub fn attach(&mut self, filename: impl Into<String>, contents: &[u8]) {
        self.filename = Some(filename.into());
        self.base64_string = Some(base64::engine::general_purpose::STANDARD.encode(contents));
    }
}

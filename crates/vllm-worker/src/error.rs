pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("job contains neither `messages` nor `prompt`")]
    MissingInput,
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("artifact setup failed: {context}: {source}")]
    Artifact {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("engine error: {0}")]
    Engine(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn artifact(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Artifact {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest(_) | Self::MissingInput | Self::InvalidConfiguration(_) | Self::Json(_)
        )
    }

    pub fn openai_error_type(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::MissingInput | Self::Json(_) => "BadRequestError",
            Self::InvalidConfiguration(_) => "InvalidConfigurationError",
            Self::Engine(_) => "EngineError",
            Self::Artifact { .. } | Self::Internal(_) | Self::Io(_) | Self::Http(_) => {
                "InternalServerError"
            }
        }
    }

    pub fn format_chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = std::error::Error::source(err);
        }
        chain.join(" | caused by: ")
    }
}

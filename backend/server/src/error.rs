use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

const GENERIC_SERVER_ERROR: &str = "Erreur serveur";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Non autorisé")]
    MissingToken,

    #[error("Token invalide")]
    Unauthenticated,

    #[error("Requête invalide")]
    MalformedPayload,

    #[error("Sélection invalide: {0}")]
    InvalidSelection(String),

    #[error("Montant invalide")]
    InvalidAmount,

    #[error("Aucun tirage actif pour le moment")]
    ConfigurationUnavailable,

    #[error("L'offre a changé, veuillez actualiser la page")]
    StaleOffer,

    #[error("Vous avez déjà acheté le maximum de 2 tickets")]
    TicketLimitExceeded,

    #[error("Crédits insuffisants")]
    InsufficientCredits,

    #[error("Code invalide")]
    UnknownCode,

    #[error("Code déjà utilisé")]
    CodeAlreadyUsed,

    #[error("Veuillez remplir tous les champs obligatoires")]
    InvalidProfile,

    #[error("Code de parrainage invalide")]
    InvalidSponsorCode,

    #[error("Compte introuvable")]
    AccountNotFound,

    #[error("Sponsor code {0} already taken")]
    SponsorCodeTaken(String),

    #[error("Transaction aborted after {0} conflicting attempts")]
    Contention(usize),

    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingToken | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::AccountNotFound => StatusCode::NOT_FOUND,
            AppError::SponsorCodeTaken(_)
            | AppError::Contention(_)
            | AppError::Store(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(Box::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            GENERIC_SERVER_ERROR.to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpResponse,
};
use serde_json::json;

use crate::{
    auth::{encode_next, load_session, wants_json, Session},
    models::Role,
    state::AppState,
};

/// Per-request ownership restriction derived from the session. Empty for
/// admins; downstream queries AND these into their predicates.
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    pub client_id: Option<String>,
    pub barber_id: Option<String>,
}

/// Any authenticated role.
pub async fn require_auth<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    gate(req, next, &[]).await
}

/// Admin or barber.
pub async fn require_staff<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    gate(req, next, &[Role::Admin, Role::Barber]).await
}

/// Admin only.
pub async fn require_admin<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    gate(req, next, &[Role::Admin]).await
}

async fn gate<B>(
    req: ServiceRequest,
    next: Next<B>,
    allowed: &[Role],
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        let response = HttpResponse::InternalServerError().finish();
        return Ok(req.into_response(response));
    };

    let session = load_session(&state.db, req.request()).await;

    let Some(session) = session else {
        let response = if wants_json(req.request()) {
            HttpResponse::Unauthorized().json(json!({ "error": "auth_required" }))
        } else {
            let back = encode_next(req.path());
            HttpResponse::Found()
                .append_header((header::LOCATION, format!("/login?next={back}")))
                .finish()
        };
        return Ok(req.into_response(response));
    };

    if !allowed.is_empty() && !allowed.contains(&session.role) {
        let response = if wants_json(req.request()) {
            HttpResponse::Forbidden().json(json!({ "error": "forbidden" }))
        } else {
            HttpResponse::Forbidden().body("Not authorized")
        };
        return Ok(req.into_response(response));
    }

    req.extensions_mut().insert(session);
    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}

/// Self-scope step: clients get their own client ID attached. Attaches
/// metadata only; never rejects.
pub async fn scope_client<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    {
        let mut extensions = req.extensions_mut();
        let own = extensions.get::<Session>().and_then(|session| {
            (session.role == Role::Client)
                .then(|| session.client_id.clone())
                .flatten()
        });
        let mut scope = extensions.get::<ScopeContext>().cloned().unwrap_or_default();
        if own.is_some() {
            scope.client_id = own;
        }
        extensions.insert(scope);
    }
    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}

/// Self-scope step: barbers get their own barber ID attached. Order relative
/// to `scope_client` does not matter.
pub async fn scope_barber<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    {
        let mut extensions = req.extensions_mut();
        let own = extensions.get::<Session>().and_then(|session| {
            (session.role == Role::Barber)
                .then(|| session.barber_id.clone())
                .flatten()
        });
        let mut scope = extensions.get::<ScopeContext>().cloned().unwrap_or_default();
        if own.is_some() {
            scope.barber_id = own;
        }
        extensions.insert(scope);
    }
    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}

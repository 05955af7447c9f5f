use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use cortex_agent::{HttpChatProvider, MemoryClient, ProviderRouter, ProviderSlot};
use cortex_bus::SqliteBus;
use cortex_core::config::CortexConfig;

use crate::messages::MessageStore;

/// Central shared state for the gateway, passed as `Arc<AppState>` to every
/// Axum handler (mirrors `cortex-memoryd`'s own `AppState` shape).
pub struct AppState {
    pub config: CortexConfig,
    pub messages: MessageStore,
    pub bus: Arc<SqliteBus>,
    pub memory_client: MemoryClient,
    pub router: ProviderRouter,
}

impl AppState {
    pub fn new(config: CortexConfig) -> anyhow::Result<Arc<Self>> {
        let messages = MessageStore::open(&config.database.gateway_path)?;
        let bus = Arc::new(SqliteBus::open(&config.bus.path)?);
        let memory_client = MemoryClient::new(config.gateway.memoryd_url.clone());

        let slots: Vec<ProviderSlot> = config
            .providers
            .entries
            .iter()
            .map(|entry| {
                let provider = HttpChatProvider::new(
                    entry.id.clone(),
                    entry.api_key.clone(),
                    entry.base_url.clone(),
                    entry.chat_path.clone(),
                );
                ProviderSlot::new(Box::new(provider), entry.max_retries)
                    .with_preferred_model(entry.model.clone())
            })
            .collect();
        if slots.is_empty() {
            anyhow::bail!("no providers configured: cortex-gateway needs at least one for chat routing");
        }
        let router = ProviderRouter::new(slots);

        Ok(Arc::new(Self {
            config,
            messages,
            bus,
            memory_client,
            router,
        }))
    }

    /// The model to use for a turn of the given complexity. A turn
    /// carrying image attachments routes to the configured vision model
    /// ahead of the complexity rule (spec §4.4 provider-selection order:
    /// vision first, then complex-reasoning, then default).
    pub fn model_for(&self, complexity: cortex_agent::Complexity, has_image_attachments: bool) -> String {
        resolve_model(&self.config.context, complexity, has_image_attachments)
    }
}

fn resolve_model(
    ctx: &cortex_core::config::ContextConfig,
    complexity: cortex_agent::Complexity,
    has_image_attachments: bool,
) -> String {
    if has_image_attachments {
        if let Some(model) = &ctx.vision_model {
            return model.clone();
        }
    }
    if complexity == cortex_agent::Complexity::Complex {
        if let Some(model) = &ctx.high_complexity_model {
            return model.clone();
        }
    }
    ctx.default_model.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::config::ContextConfig;

    #[test]
    fn image_attachments_route_to_vision_model_over_complexity() {
        let ctx = ContextConfig {
            vision_model: Some("vision-model".to_string()),
            high_complexity_model: Some("big-model".to_string()),
            ..ContextConfig::default()
        };
        let model = resolve_model(&ctx, cortex_agent::Complexity::Complex, true);
        assert_eq!(model, "vision-model");
    }

    #[test]
    fn no_attachments_falls_back_to_complexity_rule() {
        let ctx = ContextConfig {
            vision_model: Some("vision-model".to_string()),
            high_complexity_model: Some("big-model".to_string()),
            ..ContextConfig::default()
        };
        let model = resolve_model(&ctx, cortex_agent::Complexity::Complex, false);
        assert_eq!(model, "big-model");
    }

    #[test]
    fn unconfigured_vision_model_falls_through_to_default() {
        let ctx = ContextConfig::default();
        let model = resolve_model(&ctx, cortex_agent::Complexity::Simple, true);
        assert_eq!(model, ctx.default_model);
    }
}

/// Assemble the full Axum router for the gateway's HTTP/SSE surface.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/chat/stream", post(crate::http::chat::chat_stream_handler))
        .route(
            "/v1/threads/{id}/messages",
            get(crate::http::threads::thread_messages_handler),
        )
        .route(
            "/api/artifacts/gatekeeper",
            post(crate::http::artifacts::gatekeeper_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

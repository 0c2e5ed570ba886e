//! Static routing table.
//!
//! `(provider name, service name)` resolves to a closed [`Provider`], the
//! lane its jobs run on, and the schema of the model. Adding a backend means
//! adding one row here and one adapter; nothing in the dispatcher changes.

use lvgen_models::{Lane, Provider};
use lvgen_providers::luma::LUMA_MODELS;
use lvgen_providers::replicate::REPLICATE_MODELS;
use lvgen_providers::runway::RUNWAY_MODELS;
use lvgen_providers::ModelSpec;

/// Where and how a task's jobs execute.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub provider: Provider,
    pub lane: Lane,
    pub model: &'static ModelSpec,
}

/// Lane owned by each provider.
pub const fn lane_for(provider: Provider) -> Lane {
    match provider {
        Provider::Replicate => Lane::Replicate,
        Provider::Runway => Lane::Runway,
        Provider::Luma => Lane::Luma,
    }
}

/// Models each provider can run.
pub const fn models_for(provider: Provider) -> &'static [ModelSpec] {
    match provider {
        Provider::Replicate => REPLICATE_MODELS,
        Provider::Runway => RUNWAY_MODELS,
        Provider::Luma => LUMA_MODELS,
    }
}

/// Look up the route for a provider/service pair. `None` when the provider
/// is unknown or does not serve that model.
pub fn resolve(provider: &str, service_name: &str) -> Option<Route> {
    let provider: Provider = provider.parse().ok()?;
    let model = models_for(provider).iter().find(|m| m.name == service_name)?;
    Some(Route {
        provider,
        lane: lane_for(provider),
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_known_pairs() {
        let route = resolve("runway", "gen3a_turbo").unwrap();
        assert_eq!(route.provider, Provider::Runway);
        assert_eq!(route.lane, Lane::Runway);
        assert_eq!(route.model.name, "gen3a_turbo");

        let route = resolve("LumaAI", "ray-2").unwrap();
        assert_eq!(route.lane, Lane::Luma);
    }

    #[test]
    fn test_unknown_pairs_do_not_route() {
        assert!(resolve("luma", "gen3a_turbo").is_none());
        assert!(resolve("pika", "ray-2").is_none());
        assert!(resolve("replicate", "").is_none());
    }

    #[test]
    fn test_every_provider_has_a_dedicated_lane() {
        for provider in Provider::ALL {
            assert_ne!(lane_for(provider), Lane::Default);
            assert!(!models_for(provider).is_empty());
        }
    }
}

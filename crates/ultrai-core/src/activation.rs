use std::collections::BTreeMap;

use tracing::{info, warn};

use ultrai_types::{ActivationPlan, ActivationSlot, SlotReason};

use crate::cocktails::CocktailSpec;
use crate::error::EngineError;

/// Minimum number of executable slots for a run to proceed.
pub const QUORUM: usize = 2;

#[derive(Debug, Clone)]
pub struct Activation {
    /// Executable slots only, in cocktail position order.
    pub slots: Vec<ActivationSlot>,
    /// The `02_activate` artifact.
    pub plan: ActivationPlan,
}

/// Intersects the cocktail with the READY set, pairing each primary with its
/// positional fallback. A slot whose primary is missing but whose fallback is
/// ready runs the fallback in both positions; a slot with neither is dropped.
pub fn plan_activation(
    ready: &[String],
    cocktail: &CocktailSpec,
) -> Result<Activation, EngineError> {
    let mut slots = Vec::new();
    let mut reasons = BTreeMap::new();

    for (primary, fallback) in cocktail.primaries.iter().zip(&cocktail.fallbacks) {
        if ready.contains(primary) {
            reasons.insert(primary.clone(), SlotReason::Active);
            slots.push(ActivationSlot {
                primary: primary.clone(),
                fallback: fallback.clone(),
                reason: SlotReason::Active,
            });
        } else if ready.contains(fallback) {
            reasons.insert(fallback.clone(), SlotReason::FallbackOnly);
            slots.push(ActivationSlot {
                primary: fallback.clone(),
                fallback: fallback.clone(),
                reason: SlotReason::FallbackOnly,
            });
        } else {
            warn!(model = %primary, "slot excluded: neither primary nor fallback is ready");
            reasons.insert(primary.clone(), SlotReason::NotReady);
        }
    }

    if slots.len() < QUORUM {
        return Err(EngineError::ActiveLlm(format!(
            "only {} of {} cocktail slots are executable; quorum is {QUORUM}",
            slots.len(),
            cocktail.primaries.len()
        )));
    }

    info!(
        cocktail = %cocktail.name,
        executable = slots.len(),
        "activation plan ready"
    );

    let plan = ActivationPlan {
        active_list: slots.iter().map(|s| s.primary.clone()).collect(),
        backup_list: slots.iter().map(|s| s.fallback.clone()).collect(),
        quorum: QUORUM,
        reasons,
    };
    Ok(Activation { slots, plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cocktails::cocktail;

    fn ready(models: &[&str]) -> Vec<String> {
        models.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_primaries_ready_yields_active_slots() {
        let spec = cocktail("SPEEDY").expect("spec");
        let activation = plan_activation(&spec.primaries.clone(), &spec).expect("plan");
        assert_eq!(activation.slots.len(), 3);
        assert!(activation
            .slots
            .iter()
            .all(|s| s.reason == SlotReason::Active));
        assert_eq!(activation.plan.active_list, spec.primaries);
        assert_eq!(activation.plan.backup_list, spec.fallbacks);
        assert_eq!(activation.plan.quorum, 2);
    }

    #[test]
    fn missing_primary_promotes_its_fallback() {
        let spec = cocktail("SPEEDY").expect("spec");
        let mut available = spec.primaries.clone();
        available[0] = spec.fallbacks[0].clone();
        let activation = plan_activation(&available, &spec).expect("plan");
        let slot = &activation.slots[0];
        assert_eq!(slot.reason, SlotReason::FallbackOnly);
        assert_eq!(slot.primary, spec.fallbacks[0]);
        assert_eq!(slot.fallback, spec.fallbacks[0]);
        assert_eq!(
            activation.plan.reasons.get(&spec.fallbacks[0]),
            Some(&SlotReason::FallbackOnly)
        );
    }

    #[test]
    fn dead_slots_are_excluded_but_quorum_holds() {
        let spec = cocktail("SPEEDY").expect("spec");
        let available = ready(&[&spec.primaries[1], &spec.primaries[2]]);
        let activation = plan_activation(&available, &spec).expect("plan");
        assert_eq!(activation.slots.len(), 2);
        assert_eq!(
            activation.plan.reasons.get(&spec.primaries[0]),
            Some(&SlotReason::NotReady)
        );
    }

    #[test]
    fn low_pluralism_aborts_with_quorum_error() {
        let spec = cocktail("SPEEDY").expect("spec");
        let available = ready(&[&spec.primaries[0]]);
        let err = plan_activation(&available, &spec).unwrap_err();
        assert!(matches!(err, EngineError::ActiveLlm(_)));
        assert!(err.to_string().contains("quorum"));
    }
}

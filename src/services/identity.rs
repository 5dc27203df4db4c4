//! Goal identity: content addressing and the one-way anchor transition.
//!
//! A goal's identity is a 16-hex content address. Provisional (Phase A) keys
//! hash the goal type, its canonicalized intent parameters, and a coarse
//! location bucket; anchored (Phase B) keys hash the committed site. Anchoring
//! is one-way: the provisional key survives as an alias so concurrent intents
//! keyed on it still resolve to the same task.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::error::IdentityError;
use crate::domain::models::{
    BlockPos, Facing, FootprintBounds, GoalBinding, SiteSignature,
};

/// Goal types whose anchored identity includes the template digest.
pub const TEMPLATE_IDENTITY_TYPES: &[&str] = &["build_structure"];

/// Length of a goal-key content address in hex characters.
const KEY_HEX_LEN: usize = 16;

/// Hash a sequence of parts into a 16-hex content address.
///
/// Parts are NUL-separated before hashing so that part boundaries cannot be
/// forged by concatenation.
pub fn hash_goal_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    let mut first = true;
    for part in parts {
        if !first {
            hasher.update([0u8]);
        }
        hasher.update(part.as_ref().as_bytes());
        first = false;
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(KEY_HEX_LEN);
    for byte in digest.iter().take(KEY_HEX_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Bucket a position into a coarse "cx:cz" region (16-block cells).
pub fn coarse_region(pos: &BlockPos) -> String {
    format!("{}:{}", pos.x.div_euclid(16), pos.z.div_euclid(16))
}

/// Canonical string form of intent parameters for hashing.
///
/// `BTreeMap` iteration order makes the JSON rendering deterministic.
fn canonical_params(params: &BTreeMap<String, Value>) -> String {
    serde_json::to_string(params).unwrap_or_default()
}

/// Compute a Phase A (provisional) goal key.
pub fn compute_provisional_key(
    goal_type: &str,
    intent_params: &BTreeMap<String, Value>,
    bot_position: &BlockPos,
) -> String {
    hash_goal_key([
        goal_type,
        canonical_params(intent_params).as_str(),
        coarse_region(bot_position).as_str(),
    ])
}

/// Compute a Phase B (anchored) goal key.
///
/// The template digest participates only for goal types whose identity is
/// template-scoped (currently structure builds): two different templates at
/// the same site are different goals.
pub fn compute_anchored_key(
    goal_type: &str,
    ref_corner: &BlockPos,
    facing: Facing,
    template_digest: Option<&str>,
) -> String {
    let corner = ref_corner.to_string();
    let mut parts = vec![goal_type, corner.as_str(), facing.as_str()];
    if TEMPLATE_IDENTITY_TYPES.contains(&goal_type) {
        if let Some(digest) = template_digest {
            parts.push(digest);
        }
    }
    hash_goal_key(parts)
}

/// Inputs to the anchor transition.
#[derive(Debug, Clone)]
pub struct AnchorInput {
    pub position: BlockPos,
    pub ref_corner: BlockPos,
    pub facing: Facing,
    pub footprint_bounds: FootprintBounds,
    pub template_digest: Option<String>,
}

/// Perform the one-way Phase A→B transition on a binding.
///
/// Order matters and is observable: the current key is pushed into the alias
/// list, then the anchored key is computed and assigned, then the site
/// signature is set. The whole sequence runs on `&mut` — no suspension, no
/// partial state.
pub fn anchor_goal_identity(
    binding: &mut GoalBinding,
    input: AnchorInput,
) -> Result<(), IdentityError> {
    if binding.anchors.site_signature.is_some() {
        return Err(IdentityError::AlreadyAnchored(binding.goal_instance_id));
    }

    binding.goal_key_aliases.push(binding.goal_key.clone());
    binding.goal_key = compute_anchored_key(
        &binding.goal_type,
        &input.ref_corner,
        input.facing,
        input.template_digest.as_deref(),
    );
    binding.anchors.site_signature = Some(SiteSignature {
        position: input.position,
        ref_corner: input.ref_corner,
        facing: input.facing,
        footprint_bounds: input.footprint_bounds,
    });

    tracing::debug!(
        instance = %binding.goal_instance_id,
        new_key = %binding.goal_key,
        "goal identity anchored"
    );
    Ok(())
}

//! Preconditions checked at the top of each coordinator operation.

use cloudlet_common::{
    CloudletError, Instance, PolicyEnforcer, RequestContext, Result, VmState,
};

pub const CREATE_BASE_ACTION: &str = "compute:cloudlet_create_base";
pub const CREATE_OVERLAY_START_ACTION: &str = "compute:cloudlet_create_overlay_start";

/// Rejects the call unless the instance is in one of `allowed` lifecycle states.
pub fn check_instance_state(instance: &Instance, allowed: &[VmState], method: &str) -> Result<()> {
    if allowed.contains(&instance.vm_state) {
        return Ok(());
    }
    Err(CloudletError::InvalidState {
        instance_uuid: instance.uuid.clone(),
        attr: "vm_state".to_string(),
        state: instance.vm_state.to_string(),
        method: method.to_string(),
    })
}

pub fn check_policy(
    policy: &dyn PolicyEnforcer,
    ctx: &RequestContext,
    action: &str,
    instance: &Instance,
) -> Result<()> {
    policy.enforce(ctx, action, instance)
}

pub fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CloudletError::InvalidRequest(format!("Need to set {}", what)));
    }
    Ok(())
}

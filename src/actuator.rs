use crate::error::{LifecycleError, Result};
use crate::host::{ContextRecord, LockableScope, PermissionOracle, CAP_UNFREEZE};
use tracing::{debug, info};

pub const MSG_UNFROZEN: &str = "Enabled course editing successfully.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeOutcome {
    Frozen,
    AlreadyFrozen,
}

fn require_course_context(scope: &impl LockableScope, course_id: i64) -> Result<ContextRecord> {
    scope
        .course_context(course_id)?
        .ok_or(LifecycleError::ContextNotFound(course_id))
}

fn ensure_no_locked_ancestor(scope: &impl LockableScope, context_id: i64) -> Result<()> {
    match scope.locked_ancestor(context_id)? {
        Some(ancestor) => {
            debug!(context_id, ancestor, "ancestor context is locked");
            Err(LifecycleError::ParentContextLocked { context_id })
        }
        None => Ok(()),
    }
}

pub fn freeze(scope: &impl LockableScope, course_id: i64) -> Result<FreezeOutcome> {
    let context = require_course_context(scope, course_id)?;
    ensure_no_locked_ancestor(scope, context.id)?;

    if scope.is_locked(context.id)? {
        return Ok(FreezeOutcome::AlreadyFrozen);
    }
    scope.set_locked(context.id, true)?;
    info!(course_id, context_id = context.id, "course context frozen");
    Ok(FreezeOutcome::Frozen)
}

pub fn unfreeze<H>(host: &H, course_id: i64, user_id: i64) -> Result<()>
where
    H: LockableScope + PermissionOracle,
{
    let context = require_course_context(host, course_id)?;
    if !host.has_capability(user_id, CAP_UNFREEZE, context.id)? {
        return Err(LifecycleError::PermissionDenied {
            capability: CAP_UNFREEZE.to_string(),
        });
    }
    if !host.is_locked(context.id)? {
        return Err(LifecycleError::CourseNotReadOnly);
    }
    ensure_no_locked_ancestor(host, context.id)?;

    host.set_locked(context.id, false)?;
    info!(course_id, user_id, context_id = context.id, "course context unfrozen");
    Ok(())
}

use std::collections::HashSet;

use shared::{
    domain::{NetId, NetStatus, Outcome, PersonId, Severity, StatusTransitionError, UserRole},
    error::{ApiError, ErrorCode},
    protocol::{MapMarker, NetSummary, PersonForm},
};
use storage::{Storage, StorageTx, StoredNet};
use tracing::{error, info, warn};

pub mod map;
pub mod session;

pub use session::SessionState;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

struct ClaimRecord {
    salvager_id: PersonId,
    net: ClaimedNet,
}

enum ClaimedNet {
    Claimed,
    Missing,
    Unavailable(NetStatus),
}

/// Persists the session's draft net, with its reporter unless the report is
/// anonymous, and resets the report form on success.
pub async fn report_net(ctx: &ApiContext, session: &mut SessionState) -> Result<Outcome, ApiError> {
    if session.new_net.gps_coordinates.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "gps coordinates are required",
        ));
    }

    let net_id = persist_report(ctx, session).await.map_err(|err| {
        error!(error = %err, "net report rolled back");
        store_error(err)
    })?;
    info!(%net_id, anonymous = session.anonymous, "net reported");

    session.reset_report_form();
    Ok(Outcome::Confirmation)
}

async fn persist_report(ctx: &ApiContext, session: &SessionState) -> anyhow::Result<NetId> {
    let mut tx = ctx.storage.begin().await?;
    let result = write_report(&mut tx, session).await;
    tx.finish(result).await
}

async fn write_report(tx: &mut StorageTx, session: &SessionState) -> anyhow::Result<NetId> {
    let reporter_id = if session.anonymous {
        None
    } else {
        Some(tx.insert_person(&session.reporter).await?)
    };
    tx.insert_net(&session.new_net, NetStatus::Reported, reporter_id, None)
        .await
}

/// Selects a listed net for claiming. Touches only session state.
pub fn prepare_claim(session: &mut SessionState, net_id: NetId) -> Outcome {
    session.net_to_claim = Some(net_id);
    session.salvager = PersonForm::default();
    Outcome::Claim
}

/// Stores the salvager and moves the selected net to recovery pending.
///
/// The salvager row is always written. When the net has disappeared or was
/// claimed by someone else in the meantime, the net is left as it is and the
/// session gets a warning instead of an error.
pub async fn confirm_claim(
    ctx: &ApiContext,
    session: &mut SessionState,
) -> Result<Outcome, ApiError> {
    let Some(net_id) = session.net_to_claim else {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "no net selected for claiming",
        ));
    };

    let claim = persist_claim(ctx, net_id, &session.salvager)
        .await
        .map_err(|err| {
            error!(%net_id, error = %err, "net claim rolled back");
            store_error(err)
        })?;

    match claim.net {
        ClaimedNet::Claimed => {
            info!(%net_id, salvager_id = %claim.salvager_id, "net claimed");
        }
        ClaimedNet::Missing => {
            warn!(
                %net_id,
                salvager_id = %claim.salvager_id,
                "claimed net not found; salvager stored without a net"
            );
            session.push_notice(
                Severity::Warn,
                "Netz nicht gefunden",
                format!("Netz #{net_id} existiert nicht. Ihre Kontaktdaten wurden gespeichert."),
            );
        }
        ClaimedNet::Unavailable(status) => {
            warn!(
                %net_id,
                %status,
                salvager_id = %claim.salvager_id,
                "claimed net is no longer reported; salvager stored without a net"
            );
            session.push_notice(
                Severity::Warn,
                "Netz nicht verfügbar",
                format!(
                    "Netz #{net_id} hat bereits den Status {status}. Ihre Kontaktdaten wurden gespeichert."
                ),
            );
        }
    }

    session.salvager = PersonForm::default();
    session.net_to_claim = None;
    Ok(Outcome::Dashboard)
}

async fn persist_claim(
    ctx: &ApiContext,
    net_id: NetId,
    salvager: &PersonForm,
) -> anyhow::Result<ClaimRecord> {
    let mut tx = ctx.storage.begin().await?;
    let result = write_claim(&mut tx, net_id, salvager).await;
    tx.finish(result).await
}

async fn write_claim(
    tx: &mut StorageTx,
    net_id: NetId,
    salvager: &PersonForm,
) -> anyhow::Result<ClaimRecord> {
    let salvager_id = tx.insert_person(salvager).await?;

    let claimed = tx
        .advance_net(
            net_id,
            NetStatus::Reported,
            NetStatus::RecoveryPending,
            Some(salvager_id),
        )
        .await?;
    let net = if claimed {
        ClaimedNet::Claimed
    } else {
        match tx.find_net(net_id).await? {
            Some(net) => ClaimedNet::Unavailable(net.status),
            None => ClaimedNet::Missing,
        }
    };

    Ok(ClaimRecord { salvager_id, net })
}

/// Marks a claimed net as recovered. The caller stays on its current view,
/// so there is no outcome; a success notice is queued instead.
pub async fn mark_recovered(
    ctx: &ApiContext,
    session: &mut SessionState,
    net_id: NetId,
) -> Result<(), ApiError> {
    let recovered = persist_recovery(ctx, net_id).await.map_err(|err| {
        error!(%net_id, error = %err, "net recovery rolled back");
        store_error(err)
    })?;

    if recovered {
        info!(%net_id, "net recovered");
        session.push_notice(
            Severity::Info,
            "Erfolgreich!",
            format!("Netz #{net_id} wurde als geborgen markiert."),
        );
    } else {
        warn!(%net_id, "net to mark as recovered not found");
    }
    Ok(())
}

async fn persist_recovery(ctx: &ApiContext, net_id: NetId) -> anyhow::Result<bool> {
    let mut tx = ctx.storage.begin().await?;
    let result = write_recovery(&mut tx, net_id).await;
    tx.finish(result).await
}

/// The conditional update runs first so the transaction takes the write lock
/// before reading; a concurrent recovery then waits and sees the new status.
async fn write_recovery(tx: &mut StorageTx, net_id: NetId) -> anyhow::Result<bool> {
    let to = NetStatus::Recovered;
    if tx
        .advance_net(net_id, NetStatus::RecoveryPending, to, None)
        .await?
    {
        return Ok(true);
    }
    match tx.find_net(net_id).await? {
        Some(net) => Err(StatusTransitionError {
            from: net.status,
            to,
        }
        .into()),
        None => Ok(false),
    }
}

pub fn go_home() -> Outcome {
    Outcome::Index
}

pub fn select_role(session: &mut SessionState, role: UserRole) -> Outcome {
    session.user_role = Some(role);
    Outcome::Index
}

/// Reported and pending nets in insertion order. Nets sharing an identical
/// coordinate string collapse to the first one so the map shows one marker
/// per location.
pub async fn open_nets(ctx: &ApiContext) -> Result<Vec<NetSummary>, ApiError> {
    let nets = ctx
        .storage
        .list_nets_with_status(&NetStatus::OPEN)
        .await
        .map_err(internal)?;

    let mut seen = HashSet::new();
    Ok(nets
        .into_iter()
        .filter(|net| seen.insert(net.gps_coordinates.clone()))
        .map(summary)
        .collect())
}

pub async fn open_nets_map(ctx: &ApiContext) -> Result<Vec<MapMarker>, ApiError> {
    let nets = open_nets(ctx).await?;
    Ok(map::map_markers(&nets))
}

pub async fn open_nets_map_json(ctx: &ApiContext) -> Result<String, ApiError> {
    let markers = open_nets_map(ctx).await?;
    serde_json::to_string(&markers)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("map encoding failed: {e}")))
}

pub fn summary(net: StoredNet) -> NetSummary {
    NetSummary {
        net_id: net.net_id,
        gps_coordinates: net.gps_coordinates,
        estimated_size: net.estimated_size,
        status: net.status,
        reporter_id: net.reporter_id,
        salvager_id: net.salvager_id,
    }
}

fn store_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<StatusTransitionError>() {
        Some(transition) => ApiError::new(ErrorCode::Conflict, transition.to_string()),
        None => internal(err),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

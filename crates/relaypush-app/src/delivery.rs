//! Default answer to "is the alternate transport delivering right now?"

use std::sync::Arc;

use relaypush_core::prelude::*;
use relaypush_core::RegistrationStatus;

use crate::services::DeliveryPath;
use crate::store::PushValues;

/// Derives the delivery path from the persisted registration state
///
/// Active iff the transport is enabled in settings, an endpoint is stored and
/// the status is `Registered` or `AirGapped`. Store read failures count as
/// inactive.
#[derive(Debug)]
pub struct StoreDeliveryPath {
    values: Arc<PushValues>,
    enabled: bool,
}

impl StoreDeliveryPath {
    pub fn new(values: Arc<PushValues>, enabled: bool) -> Self {
        Self { values, enabled }
    }
}

impl DeliveryPath for StoreDeliveryPath {
    fn is_alternate_transport_active(&self) -> bool {
        if !self.enabled {
            return false;
        }

        match self.values.snapshot() {
            Ok(snapshot) => {
                snapshot.endpoint.is_some()
                    && matches!(
                        snapshot.status,
                        RegistrationStatus::Registered | RegistrationStatus::AirGapped
                    )
            }
            Err(e) => {
                warn!("Could not read registration state: {}", e);
                false
            }
        }
    }
}

use serde::{Deserialize, Serialize};

/// CPU values are nano-CPUs (10^9 per core), memory values are bytes.
///
/// An unset field is not sent to the orchestrator at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu_limit: Option<u64>,
    #[serde(default)]
    pub mem_limit: Option<u64>,
    #[serde(default)]
    pub cpu_reservation: Option<u64>,
    #[serde(default)]
    pub mem_reservation: Option<u64>,
}

impl ResourceSpec {
    pub fn has_limits(&self) -> bool {
        self.cpu_limit.is_some() || self.mem_limit.is_some()
    }

    pub fn has_reservations(&self) -> bool {
        self.cpu_reservation.is_some() || self.mem_reservation.is_some()
    }

    /// Reports whether any reservation is larger than its matching limit.
    /// The orchestrator rejects such specs; we only warn about them.
    pub fn reservation_exceeds_limit(&self) -> bool {
        fn exceeds(reservation: Option<u64>, limit: Option<u64>) -> bool {
            matches!((reservation, limit), (Some(r), Some(l)) if r > l)
        }
        exceeds(self.cpu_reservation, self.cpu_limit) || exceeds(self.mem_reservation, self.mem_limit)
    }
}

use std::collections::BTreeMap;

/// Read-only view of the per-interface link capacities of this AS.
/// Interfaces are enumerated in a stable order.
pub trait Capacities: Send + Sync {
    fn ingress_interfaces(&self) -> Vec<u16>;
    fn egress_interfaces(&self) -> Vec<u16>;
    /// Capacity of an ingress interface in kbps; 0 for unknown interfaces.
    fn capacity_ingress(&self, ifid: u16) -> u64;
    /// Capacity of an egress interface in kbps; 0 for unknown interfaces.
    fn capacity_egress(&self, ifid: u16) -> u64;
}

/// Capacity oracle backed by explicit per-interface maps.
#[derive(Debug, Clone, Default)]
pub struct InterfaceCapacities {
    ingress: BTreeMap<u16, u64>,
    egress: BTreeMap<u16, u64>,
}

impl InterfaceCapacities {
    pub fn new(ingress: BTreeMap<u16, u64>, egress: BTreeMap<u16, u64>) -> Self {
        Self { ingress, egress }
    }

    /// Same capacity for every listed interface, in both directions.
    pub fn uniform(interfaces: &[u16], capacity: u64) -> Self {
        let map: BTreeMap<u16, u64> = interfaces.iter().map(|&i| (i, capacity)).collect();
        Self { ingress: map.clone(), egress: map }
    }

    pub fn is_empty(&self) -> bool {
        self.ingress.is_empty() && self.egress.is_empty()
    }
}

impl Capacities for InterfaceCapacities {
    fn ingress_interfaces(&self) -> Vec<u16> {
        self.ingress.keys().copied().collect()
    }

    fn egress_interfaces(&self) -> Vec<u16> {
        self.egress.keys().copied().collect()
    }

    fn capacity_ingress(&self, ifid: u16) -> u64 {
        self.ingress.get(&ifid).copied().unwrap_or(0)
    }

    fn capacity_egress(&self, ifid: u16) -> u64 {
        self.egress.get(&ifid).copied().unwrap_or(0)
    }
}

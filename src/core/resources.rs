use std::fmt;

use super::state::Pid;
use crate::{KernelError, KernelResult};

pub const PRINTERS: u8 = 2;
pub const PORTS: u8 = 3;

/// A single-owner I/O unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Scanner,
    Printer(u8),
    Modem,
    Port(u8),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Scanner => write!(f, "scanner"),
            Unit::Printer(id) => write!(f, "printer {id}"),
            Unit::Modem => write!(f, "modem"),
            Unit::Port(id) => write!(f, "port {id}"),
        }
    }
}

/// Units a process needs before it may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demand {
    pub printer: Option<u8>,
    pub scanner: bool,
    pub modem: bool,
    pub port: Option<u8>,
}

impl Demand {
    /// Build from raw record selectors (0 = none).
    pub fn from_selectors(printer: u32, scanner: u32, modem: u32, port: u32) -> KernelResult<Self> {
        let printer = match printer {
            0 => None,
            id if id <= PRINTERS as u32 => Some(id as u8),
            id => return Err(KernelError::UnknownUnit(format!("printer {id}"))),
        };
        let port = match port {
            0 => None,
            id if id <= PORTS as u32 => Some(id as u8),
            id => return Err(KernelError::UnknownUnit(format!("port {id}"))),
        };
        let flag = |value: u32, what: &str| match value {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(KernelError::UnknownUnit(format!("{what} flag {v}"))),
        };
        Ok(Self {
            printer,
            scanner: flag(scanner, "scanner")?,
            modem: flag(modem, "modem")?,
            port,
        })
    }

    pub fn units(&self) -> impl Iterator<Item = Unit> {
        [
            self.scanner.then_some(Unit::Scanner),
            self.printer.map(Unit::Printer),
            self.modem.then_some(Unit::Modem),
            self.port.map(Unit::Port),
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.units().next().is_none()
    }
}

/// Owner table for every I/O unit in the machine.
#[derive(Debug, Default)]
pub struct ResourceArbiter {
    scanner: Option<Pid>,
    printers: [Option<Pid>; PRINTERS as usize],
    modem: Option<Pid>,
    ports: [Option<Pid>; PORTS as usize],
}

impl ResourceArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    // None for a printer or port id outside the machine
    fn slot(&self, unit: Unit) -> Option<&Option<Pid>> {
        match unit {
            Unit::Scanner => Some(&self.scanner),
            Unit::Printer(id) => self.printers.get(usize::from(id).checked_sub(1)?),
            Unit::Modem => Some(&self.modem),
            Unit::Port(id) => self.ports.get(usize::from(id).checked_sub(1)?),
        }
    }

    fn slot_mut(&mut self, unit: Unit) -> Option<&mut Option<Pid>> {
        match unit {
            Unit::Scanner => Some(&mut self.scanner),
            Unit::Printer(id) => self.printers.get_mut(usize::from(id).checked_sub(1)?),
            Unit::Modem => Some(&mut self.modem),
            Unit::Port(id) => self.ports.get_mut(usize::from(id).checked_sub(1)?),
        }
    }

    /// Current owner; `None` also for units the machine does not have.
    pub fn owner(&self, unit: Unit) -> Option<Pid> {
        self.slot(unit).copied().flatten()
    }

    /// All-or-nothing grant. Units `pid` already owns count as available.
    pub fn request(&mut self, pid: Pid, demand: &Demand) -> KernelResult<Vec<Unit>> {
        if let Some(unit) = demand.units().find(|&unit| self.slot(unit).is_none()) {
            return Err(KernelError::UnknownUnit(unit.to_string()));
        }
        if let Some((unit, owner)) = demand
            .units()
            .find_map(|unit| self.owner(unit).filter(|&o| o != pid).map(|o| (unit, o)))
        {
            return Err(KernelError::ResourceBusy { unit, owner });
        }

        let granted: Vec<Unit> = demand.units().collect();
        for &unit in &granted {
            if let Some(slot) = self.slot_mut(unit) {
                *slot = Some(pid);
            }
        }
        Ok(granted)
    }

    /// Free every unit owned by `pid`. Returns what was freed.
    pub fn release(&mut self, pid: Pid) -> Vec<Unit> {
        let mut freed = Vec::new();
        for unit in Self::all_units() {
            if let Some(slot) = self.slot_mut(unit).filter(|slot| **slot == Some(pid)) {
                *slot = None;
                freed.push(unit);
            }
        }
        freed
    }

    pub fn held_by(&self, pid: Pid) -> Vec<Unit> {
        Self::all_units()
            .filter(|&unit| self.owner(unit) == Some(pid))
            .collect()
    }

    fn all_units() -> impl Iterator<Item = Unit> {
        std::iter::once(Unit::Scanner)
            .chain((1..=PRINTERS).map(Unit::Printer))
            .chain(std::iter::once(Unit::Modem))
            .chain((1..=PORTS).map(Unit::Port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand(printer: u32, scanner: u32, modem: u32, port: u32) -> Demand {
        Demand::from_selectors(printer, scanner, modem, port).unwrap()
    }

    #[test]
    fn test_selectors_are_validated() {
        assert!(Demand::from_selectors(3, 0, 0, 0).is_err());
        assert!(Demand::from_selectors(0, 0, 0, 4).is_err());
        assert!(Demand::from_selectors(0, 2, 0, 0).is_err());
        assert!(demand(0, 0, 0, 0).is_empty());
    }

    #[test]
    fn test_request_is_all_or_nothing() {
        let mut arbiter = ResourceArbiter::new();
        arbiter.request(1, &demand(0, 0, 1, 0)).unwrap();

        // Printer 1 and port 2 are free, but the modem is not.
        let err = arbiter.request(2, &demand(1, 0, 1, 2)).unwrap_err();
        assert_eq!(
            err,
            KernelError::ResourceBusy {
                unit: Unit::Modem,
                owner: 1
            }
        );
        assert_eq!(arbiter.owner(Unit::Printer(1)), None);
        assert_eq!(arbiter.owner(Unit::Port(2)), None);
        assert!(arbiter.held_by(2).is_empty());
    }

    #[test]
    fn test_request_grants_every_unit() {
        let mut arbiter = ResourceArbiter::new();
        let granted = arbiter.request(5, &demand(2, 1, 1, 3)).unwrap();
        assert_eq!(
            granted,
            vec![Unit::Scanner, Unit::Printer(2), Unit::Modem, Unit::Port(3)]
        );
        assert_eq!(arbiter.owner(Unit::Printer(2)), Some(5));

        // Re-requesting what it already owns succeeds.
        assert!(arbiter.request(5, &demand(2, 1, 0, 0)).is_ok());
    }

    #[test]
    fn test_release_frees_everything_owned() {
        let mut arbiter = ResourceArbiter::new();
        arbiter.request(1, &demand(1, 1, 0, 1)).unwrap();
        arbiter.request(2, &demand(2, 0, 0, 2)).unwrap();

        let freed = arbiter.release(1);
        assert_eq!(freed, vec![Unit::Scanner, Unit::Printer(1), Unit::Port(1)]);
        assert_eq!(arbiter.held_by(2), vec![Unit::Printer(2), Unit::Port(2)]);

        assert!(arbiter.release(1).is_empty());
        assert!(arbiter.release(42).is_empty());
    }

    #[test]
    fn test_units_outside_the_machine_are_refused() {
        let mut arbiter = ResourceArbiter::new();
        let bogus = Demand {
            printer: Some(0),
            ..Default::default()
        };
        assert_eq!(
            arbiter.request(1, &bogus),
            Err(KernelError::UnknownUnit("printer 0".into()))
        );
        let bogus = Demand {
            scanner: true,
            port: Some(PORTS + 1),
            ..Default::default()
        };
        assert_eq!(
            arbiter.request(1, &bogus),
            Err(KernelError::UnknownUnit("port 4".into()))
        );
        assert_eq!(arbiter.owner(Unit::Scanner), None);
        assert_eq!(arbiter.owner(Unit::Port(9)), None);
    }
}

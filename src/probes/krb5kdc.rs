use crate::counter::Counter;
use crate::session::{Collect, SessionSnapshot};

/// KDC function a result code was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KdcFunction {
    FinishProcessAsReq = 0,
    FinishDispatchCache = 1,
    ProcessTgsReq = 2,
}

/// Number of probed KDC functions.
pub const KDC_FUNCTION_COUNT: usize = 3;

impl KdcFunction {
    /// Canonical metric label name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FinishProcessAsReq => "finish_process_as_req",
            Self::FinishDispatchCache => "finish_dispatch_cache",
            Self::ProcessTgsReq => "process_tgs_req",
        }
    }

    /// All probed functions.
    pub fn all() -> &'static [Self] {
        &[
            Self::FinishProcessAsReq,
            Self::FinishDispatchCache,
            Self::ProcessTgsReq,
        ]
    }
}

/// Symbolic category for a Kerberos protocol error code.
///
/// Codes 0 through 29 map one-to-one onto the protocol's error space;
/// everything else lands in Unknown so classification totals always match
/// the number of observed calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KdcErrorClass {
    None = 0,
    NameExp = 1,
    ServiceExp = 2,
    BadPvno = 3,
    COldMastKvno = 4,
    SOldMastKvno = 5,
    CPrincipalUnknown = 6,
    SPrincipalUnknown = 7,
    PrincipalNotUnique = 8,
    NullKey = 9,
    CannotPostdate = 10,
    NeverValid = 11,
    Policy = 12,
    BadOption = 13,
    EtypeNosupp = 14,
    SumtypeNosupp = 15,
    PadataTypeNosupp = 16,
    TrtypeNosupp = 17,
    ClientRevoked = 18,
    ServiceRevoked = 19,
    TgtRevoked = 20,
    ClientNotyet = 21,
    ServiceNotyet = 22,
    KeyExp = 23,
    PreauthFailed = 24,
    PreauthRequired = 25,
    ServerNomatch = 26,
    MustUseUser2user = 27,
    PathNotAccepted = 28,
    SvcUnavailable = 29,
    Unknown = 30,
}

/// Number of KdcErrorClass variants including Unknown.
pub const KDC_CLASS_COUNT: usize = 31;

impl KdcErrorClass {
    /// Classifies a raw result code. Total: unmapped codes go to Unknown.
    pub fn classify(code: u64) -> Self {
        match code {
            0 => Self::None,
            1 => Self::NameExp,
            2 => Self::ServiceExp,
            3 => Self::BadPvno,
            4 => Self::COldMastKvno,
            5 => Self::SOldMastKvno,
            6 => Self::CPrincipalUnknown,
            7 => Self::SPrincipalUnknown,
            8 => Self::PrincipalNotUnique,
            9 => Self::NullKey,
            10 => Self::CannotPostdate,
            11 => Self::NeverValid,
            12 => Self::Policy,
            13 => Self::BadOption,
            14 => Self::EtypeNosupp,
            15 => Self::SumtypeNosupp,
            16 => Self::PadataTypeNosupp,
            17 => Self::TrtypeNosupp,
            18 => Self::ClientRevoked,
            19 => Self::ServiceRevoked,
            20 => Self::TgtRevoked,
            21 => Self::ClientNotyet,
            22 => Self::ServiceNotyet,
            23 => Self::KeyExp,
            24 => Self::PreauthFailed,
            25 => Self::PreauthRequired,
            26 => Self::ServerNomatch,
            27 => Self::MustUseUser2user,
            28 => Self::PathNotAccepted,
            29 => Self::SvcUnavailable,
            _ => Self::Unknown,
        }
    }

    /// Canonical category label, matching what collectors already report.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::NameExp => "NAME_EXP",
            Self::ServiceExp => "SERVICE_EXP",
            Self::BadPvno => "BAD_PVNO",
            Self::COldMastKvno => "C_OLD_MAST_KVNO",
            Self::SOldMastKvno => "S_OLD_MAST_KVNO",
            Self::CPrincipalUnknown => "C_PRINCIPAL_UNKNOWN",
            Self::SPrincipalUnknown => "S_PRINCIPAL_UNKNOWN",
            Self::PrincipalNotUnique => "PRINCIPAL_NOT_UNIQUE",
            Self::NullKey => "NULL_KEY",
            Self::CannotPostdate => "CANNOT_POSTDATE",
            Self::NeverValid => "NEVER_VALID",
            Self::Policy => "POLICY",
            Self::BadOption => "BADOPTION",
            Self::EtypeNosupp => "ETYPE_NOSUPP",
            Self::SumtypeNosupp => "SUMTYPE_NOSUPP",
            Self::PadataTypeNosupp => "PADATA_TYPE_NOSUPP",
            Self::TrtypeNosupp => "TRTYPE_NOSUPP",
            Self::ClientRevoked => "CLIENT_REVOKED",
            Self::ServiceRevoked => "SERVICE_REVOKED",
            Self::TgtRevoked => "TGT_REVOKED",
            Self::ClientNotyet => "CLIENT_NOTYET",
            Self::ServiceNotyet => "SERVICE_NOTYET",
            Self::KeyExp => "KEY_EXP",
            Self::PreauthFailed => "PREAUTH_FAILED",
            Self::PreauthRequired => "PREAUTH_REQUIRED",
            Self::ServerNomatch => "SERVER_NOMATCH",
            Self::MustUseUser2user => "MUST_USE_USER2USER",
            Self::PathNotAccepted => "PATH_NOT_ACCEPTED",
            Self::SvcUnavailable => "SVC_UNAVAILABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// All categories in numeric order, Unknown last.
    pub fn all() -> &'static [Self] {
        &[
            Self::None,
            Self::NameExp,
            Self::ServiceExp,
            Self::BadPvno,
            Self::COldMastKvno,
            Self::SOldMastKvno,
            Self::CPrincipalUnknown,
            Self::SPrincipalUnknown,
            Self::PrincipalNotUnique,
            Self::NullKey,
            Self::CannotPostdate,
            Self::NeverValid,
            Self::Policy,
            Self::BadOption,
            Self::EtypeNosupp,
            Self::SumtypeNosupp,
            Self::PadataTypeNosupp,
            Self::TrtypeNosupp,
            Self::ClientRevoked,
            Self::ServiceRevoked,
            Self::TgtRevoked,
            Self::ClientNotyet,
            Self::ServiceNotyet,
            Self::KeyExp,
            Self::PreauthFailed,
            Self::PreauthRequired,
            Self::ServerNomatch,
            Self::MustUseUser2user,
            Self::PathNotAccepted,
            Self::SvcUnavailable,
            Self::Unknown,
        ]
    }
}

/// A KDC function observation carrying its raw result code.
#[derive(Debug, Clone, Copy)]
pub struct KdcEvent {
    pub function: KdcFunction,
    pub code: u64,
}

/// Kerberos KDC probe family: one counter per (function, category).
pub struct KdcProbe {
    counts: [[Counter; KDC_CLASS_COUNT]; KDC_FUNCTION_COUNT],
}

impl KdcProbe {
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| std::array::from_fn(|_| Counter::new())),
        }
    }

    pub fn handle(&self, event: KdcEvent) {
        let class = KdcErrorClass::classify(event.code);
        self.counts[event.function as usize][class as usize].increment();
    }

    /// Cumulative count for one (function, category) cell.
    pub fn count(&self, function: KdcFunction, class: KdcErrorClass) -> u64 {
        self.counts[function as usize][class as usize].value()
    }
}

impl Default for KdcProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Collect for KdcProbe {
    fn collect(&self, snap: &mut SessionSnapshot) {
        for function in KdcFunction::all() {
            for class in KdcErrorClass::all() {
                snap.push_counter(
                    format!("krb5kdc/{}/{}", function.as_str(), class.as_str()),
                    &self.counts[*function as usize][*class as usize],
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_defined_code_maps_to_its_category() {
        for (code, class) in KdcErrorClass::all().iter().enumerate().take(30) {
            assert_eq!(KdcErrorClass::classify(code as u64), *class);
            assert_eq!(*class as usize, code);
        }
    }

    #[test]
    fn test_undefined_codes_map_to_unknown() {
        assert_eq!(KdcErrorClass::classify(30), KdcErrorClass::Unknown);
        assert_eq!(KdcErrorClass::classify(31), KdcErrorClass::Unknown);
        assert_eq!(KdcErrorClass::classify(u64::MAX), KdcErrorClass::Unknown);
    }

    #[test]
    fn test_categories_partition_the_domain() {
        // One-to-one over the defined range: distinct categories, distinct
        // labels, and classify is a function (single output per code).
        let mut seen = std::collections::HashSet::new();
        for code in 0..30u64 {
            let class = KdcErrorClass::classify(code);
            assert!(seen.insert(class.as_str()), "duplicate for code {code}");
            assert_ne!(class, KdcErrorClass::Unknown);
        }
        assert_eq!(KdcErrorClass::all().len(), KDC_CLASS_COUNT);
    }

    #[test]
    fn test_counts_are_per_function_and_category() {
        let p = KdcProbe::new();
        p.handle(KdcEvent {
            function: KdcFunction::FinishProcessAsReq,
            code: 24, // PREAUTH_FAILED
        });
        p.handle(KdcEvent {
            function: KdcFunction::FinishProcessAsReq,
            code: 24,
        });
        p.handle(KdcEvent {
            function: KdcFunction::ProcessTgsReq,
            code: 24,
        });
        p.handle(KdcEvent {
            function: KdcFunction::FinishDispatchCache,
            code: 9_999, // UNKNOWN, counted rather than dropped
        });

        assert_eq!(
            p.count(KdcFunction::FinishProcessAsReq, KdcErrorClass::PreauthFailed),
            2
        );
        assert_eq!(
            p.count(KdcFunction::ProcessTgsReq, KdcErrorClass::PreauthFailed),
            1
        );
        assert_eq!(
            p.count(KdcFunction::FinishDispatchCache, KdcErrorClass::Unknown),
            1
        );
        assert_eq!(
            p.count(KdcFunction::FinishDispatchCache, KdcErrorClass::PreauthFailed),
            0
        );
    }
}

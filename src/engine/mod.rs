pub mod cancel;
pub mod enrollment;
pub mod purge;
pub mod reconcile;
pub mod resolver;
pub mod session;
pub mod tier;
pub mod view;

pub use cancel::{LoadGate, LoadTicket};
pub use enrollment::{EnrollmentFilter, EnrollmentHistory};
pub use purge::{confirmation_phrase, delete_all_records_for_resolved_meetings, PurgeReport};
pub use reconcile::{Reconciler, RosterLoad, RosterScope, ALL_UNITS};
pub use resolver::{BatchResolution, CombinedModes, MeetingResolver, Registered};
pub use session::{
    AttendanceChoice, AttendanceMark, CommitFailure, CommitReport, DiscardOutcome, EditSession,
    EditSnapshot, SessionState,
};
pub use tier::{TierIndex, TierLists};
pub use view::RosterView;

//! Farm broadcasts.
//!
//! [`MembershipProvider`] resolves who qualifies for a farm's broadcasts;
//! [`BroadcastComposer`] records the message and fans it out.

pub mod audience;
pub mod composer;

pub use audience::{
    AudienceMember, MembershipProvider, MembershipRecord, StaticMembershipProvider, dedupe_audience,
};
pub use composer::{BroadcastComposer, BroadcastDraft, BroadcastReceipt, FanOutSummary};

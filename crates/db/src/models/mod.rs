mod clip;
mod keyword;
mod node;
mod privacy_rule;
mod speaker;

pub use clip::{Clip, ClipStatus, TranscriptSegment, WorkerLease};
pub use keyword::Keyword;
pub use node::{Node, NodeStatus};
pub use privacy_rule::{PrivacyRule, RuleSpec};
pub use speaker::Speaker;

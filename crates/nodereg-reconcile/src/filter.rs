//! Membership filter.

use tracing::debug;

use nodereg_core::Member;

/// Whether `member` carries `tag_name=tag_value` in its metadata.
///
/// A missing tag or a different value excludes the member; neither is
/// an error.
pub fn includes(member: &Member, tag_name: &str, tag_value: &str) -> bool {
    match member.metadata.get(tag_name) {
        None => {
            debug!(member = %member.name, tag = %tag_name, "skipping member, tag not in metadata");
            false
        }
        Some(value) if value != tag_value => {
            debug!(
                member = %member.name,
                tag = %tag_name,
                value = %value,
                expected = %tag_value,
                "skipping member, tag value does not match"
            );
            false
        }
        Some(_) => true,
    }
}

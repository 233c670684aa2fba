//! Input trait - source-type specific collection logic

use contracts::Source;

use crate::context::{Context, TestContext};
use crate::cursor::Cursor;
use crate::error::{BoxError, InputError, Result};
use crate::publisher::Publisher;

/// A stateful input type
///
/// One instance serves every source of a configured input; `run` is invoked
/// concurrently once per source. Implementations own their retry policy and
/// return an error only when the source cannot continue.
#[trait_variant::make(Input: Send)]
pub trait LocalInput {
    /// The sources this input collects from
    type Source: Source + 'static;

    /// Input type name
    fn name(&self) -> &str;

    /// Whether the input only uses approved cryptographic algorithms
    fn is_fips_capable(&self) -> bool {
        true
    }

    /// Validate that `source` could be collected, without collecting
    async fn test(&self, source: &Self::Source, ctx: &TestContext) -> std::result::Result<(), BoxError>;

    /// Collect from `source` until done, failed or cancelled
    async fn run(
        &self,
        ctx: &Context,
        source: &Self::Source,
        cursor: &Cursor,
        publisher: &Publisher,
    ) -> std::result::Result<(), BoxError>;
}

/// Reject inputs that are not FIPS capable
pub fn check_fips_capability<I: Input>(input: &I) -> Result<()> {
    if input.is_fips_capable() {
        return Ok(());
    }
    Err(InputError::configuration(format!(
        "running a FIPS-capable distribution but input [{}] is not FIPS capable",
        input.name()
    )))
}

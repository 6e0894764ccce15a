//! Request-time evaluation of processor instances.

use tracing::{debug, warn};

use crate::processor::instance::ProcessorInstance;
use crate::rcode::ResultCode;
use crate::request::Request;
use crate::template::{DefaultExpander, Expander};

impl ProcessorInstance {
    /// Evaluate the instance against `request`.
    ///
    /// The source template is expanded first, with the processor's escape
    /// capability applied to interpolated values. If expansion fails the
    /// processor is not called and `Fail` is returned; otherwise the
    /// processor's own result code is returned unchanged.
    pub fn evaluate(&self, expander: &dyn Expander, request: &mut Request) -> ResultCode {
        let slot = self.definition.snapshot();

        let value = match expander.expand(request, &self.source, slot.spec.escape.as_deref(), &slot.owner) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "({}) Failed expanding source of map processor '{}': {}",
                    request.id,
                    self.definition.name(),
                    e
                );
                return ResultCode::Fail;
            }
        };

        debug!(
            "({}) Calling map processor '{}' with {} rules",
            request.id,
            self.definition.name(),
            self.rules.len()
        );

        let rcode = slot
            .spec
            .evaluate
            .evaluate(&slot.owner, self.data.as_ref(), request, &value, &self.rules);

        debug!(
            "({}) Map processor '{}' returned {}",
            request.id,
            self.definition.name(),
            rcode
        );
        rcode
    }

    /// [`evaluate`](Self::evaluate) with the [`DefaultExpander`].
    pub fn evaluate_default(&self, request: &mut Request) -> ResultCode {
        self.evaluate(&DefaultExpander, request)
    }
}

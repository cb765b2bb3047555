//! Evaluator contract: checks who is calling the validation entry points and
//! records every accepted invocation so flows and tests can inspect it.

use std::collections::HashMap;

use starknet::core::types::FieldElement;
use tracing::info;

use crate::blockchain::types::{selectors, CalldataReader};
use crate::devnet::state::{CallInfo, ContractKind, ExecutionContext};
use crate::types::{felt_to_usize, RelayError, RelayResult};

/// A recorded call into a validation entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub caller: FieldElement,
    pub args: Vec<FieldElement>,
}

#[derive(Debug, Clone)]
pub struct EvaluatorState {
    address: FieldElement,
    invocations: HashMap<FieldElement, Vec<Invocation>>,
}

impl EvaluatorState {
    pub fn new(address: FieldElement) -> Self {
        Self {
            address,
            invocations: HashMap::new(),
        }
    }

    pub fn invocations(&self, selector: &FieldElement) -> &[Invocation] {
        self.invocations.get(selector).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn invoke(&mut self, ctx: &mut ExecutionContext<'_>, call: &CallInfo<'_>) -> RelayResult<Vec<FieldElement>> {
        match call.selector {
            s if s == *selectors::VALIDATE_MULTICALL => {
                if call.calldata.len() != 1 {
                    return Err(RelayError::EvaluatorRejected(format!(
                        "validate_multicall takes exactly one argument, got {}",
                        call.calldata.len()
                    )));
                }
                self.require_caller(ctx, call, ContractKind::MulticallAccount)?;
                self.record(ctx, call)
            }
            s if s == *selectors::VALIDATE_MULTISIG => {
                self.require_caller(ctx, call, ContractKind::Multisig)?;
                self.record(ctx, call)
            }
            s if s == *selectors::GET_INVOCATION_COUNT => {
                let mut reader = CalldataReader::new(call.calldata);
                let selector = reader.next()?;
                reader.finish()?;
                Ok(vec![FieldElement::from(self.invocations(&selector).len() as u64)])
            }
            s if s == *selectors::GET_INVOCATION => {
                let mut reader = CalldataReader::new(call.calldata);
                let selector = reader.next()?;
                let index = felt_to_usize(reader.next()?)?;
                reader.finish()?;

                let invocation = self.invocations(&selector).get(index).ok_or_else(|| {
                    RelayError::MalformedCalldata(format!("no invocation {} for selector {:#x}", index, selector))
                })?;

                let mut out = vec![invocation.caller, FieldElement::from(invocation.args.len() as u64)];
                out.extend_from_slice(&invocation.args);
                Ok(out)
            }
            _ => Err(call.entry_point_not_found()),
        }
    }

    fn require_caller(&self, ctx: &ExecutionContext<'_>, call: &CallInfo<'_>, expected: ContractKind) -> RelayResult<()> {
        match ctx.kind_of(&call.caller) {
            Some(kind) if kind == expected => Ok(()),
            Some(kind) => Err(RelayError::EvaluatorRejected(format!(
                "caller {:#x} is a {} contract, expected {}",
                call.caller,
                kind.name(),
                expected.name()
            ))),
            None => Err(RelayError::EvaluatorRejected(format!(
                "caller {:#x} is not a deployed contract",
                call.caller
            ))),
        }
    }

    fn record(&mut self, ctx: &mut ExecutionContext<'_>, call: &CallInfo<'_>) -> RelayResult<Vec<FieldElement>> {
        let entries = self.invocations.entry(call.selector).or_default();
        let index = entries.len() as u64;
        entries.push(Invocation {
            caller: call.caller,
            args: call.calldata.to_vec(),
        });

        info!(
            "Evaluator recorded invocation #{} of {:#x} from {:#x}",
            index, call.selector, call.caller
        );
        ctx.emit(
            self.address,
            vec![*selectors::EVENT_INVOCATION_RECORDED],
            vec![call.caller, call.selector, FieldElement::from(index)],
        );

        Ok(vec![FieldElement::ONE])
    }
}

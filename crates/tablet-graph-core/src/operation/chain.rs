//! Operation chains with compile-time wiring.
//!
//! A chain feeds each operation's output into the next operation's input.
//! The builder enforces compatibility through the [`ChainStep`] associated
//! types, so a mis-wired chain does not construct. Chains can also arrive
//! untyped (parsed from JSON); executors re-check those at runtime with
//! [`OperationChain::validate_wiring`], whose mismatch arm is the explicit
//! unsupported-composition error.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::OperationError;

use super::{
    AddElements, GetAdjacentEntitySeeds, GetAllElements, GetElements, GetElementsBetweenSets,
    GetElementsInRanges, GetElementsWithinSet, GraphOperation, SummariseGroupOverRanges,
};

/// Runtime tag of a chain value, mirroring the marker types below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// No chained input; the operation only runs at the head of a chain.
    None,
    Seeds,
    Elements,
    Report,
}

impl IoKind {
    pub fn name(&self) -> &'static str {
        match self {
            IoKind::None => "nothing",
            IoKind::Seeds => "entity seeds",
            IoKind::Elements => "elements",
            IoKind::Report => "an ingest report",
        }
    }
}

/// Marker: a lazy element stream.
pub struct Elements;
/// Marker: a stream of entity seeds.
pub struct Seeds;
/// Marker: the result of an `AddElements` step.
pub struct Report;
/// Marker for operations that take no chained input. Uninhabited, so no
/// builder can ever produce it as a predecessor output.
pub enum NoInput {}

/// A typed operation step: what it consumes, what it produces.
pub trait ChainStep {
    type Input;
    type Output;

    fn into_operation(self) -> GraphOperation;
}

macro_rules! chain_step {
    ($op:ty, $input:ty, $output:ty, $variant:ident) => {
        impl ChainStep for $op {
            type Input = $input;
            type Output = $output;

            fn into_operation(self) -> GraphOperation {
                GraphOperation::$variant(self)
            }
        }
    };
}

chain_step!(GetElements, Seeds, Elements, GetElements);
chain_step!(GetAllElements, NoInput, Elements, GetAllElements);
chain_step!(GetAdjacentEntitySeeds, Seeds, Seeds, GetAdjacentEntitySeeds);
chain_step!(GetElementsWithinSet, Seeds, Elements, GetElementsWithinSet);
chain_step!(GetElementsBetweenSets, Seeds, Elements, GetElementsBetweenSets);
chain_step!(GetElementsInRanges, NoInput, Elements, GetElementsInRanges);
chain_step!(
    SummariseGroupOverRanges,
    NoInput,
    Elements,
    SummariseGroupOverRanges
);
chain_step!(AddElements, Elements, Report, AddElements);

/// An ordered list of operations whose wiring has been checked: at compile
/// time when built through [`OperationChain::starting_with`], at runtime via
/// [`OperationChain::validate_wiring`] for chains parsed from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct OperationChain<Out = Dynamic> {
    pub operations: Vec<GraphOperation>,
    #[serde(skip)]
    _out: PhantomData<fn() -> Out>,
}

/// Output marker for untyped chains.
pub struct Dynamic;

impl OperationChain<Dynamic> {
    /// Wraps operations parsed from the JSON surface; wiring is checked when
    /// the chain is executed.
    pub fn from_operations(operations: Vec<GraphOperation>) -> Self {
        OperationChain {
            operations,
            _out: PhantomData,
        }
    }
}

impl<Out> OperationChain<Out> {
    /// Starts a typed chain. The first operation runs from its own inline
    /// seeds or ranges; its declared input type is irrelevant at the head.
    ///
    /// # Example
    /// ```rust
    /// use tablet_graph_core::operation::chain::{Elements, OperationChain};
    /// use tablet_graph_core::operation::{GetAdjacentEntitySeeds, GetElements};
    /// use tablet_graph_core::types::EntitySeed;
    ///
    /// // Hop to the neighbours of "1", then fetch everything touching them.
    /// let chain = OperationChain::<Elements>::starting_with(
    ///     GetAdjacentEntitySeeds::new([EntitySeed::new("1")]),
    /// )
    /// .then(GetElements::new([]))
    /// .build();
    ///
    /// assert!(chain.validate_wiring().is_ok());
    /// ```
    pub fn starting_with<Op>(op: Op) -> ChainBuilder<Op::Output>
    where
        Op: ChainStep,
    {
        ChainBuilder {
            operations: vec![op.into_operation()],
            _out: PhantomData,
        }
    }

    /// Runtime wiring check: every step after the first must accept exactly
    /// what its predecessor produces.
    pub fn validate_wiring(&self) -> Result<(), OperationError> {
        if self.operations.is_empty() {
            return Err(OperationError::EmptyChain);
        }
        for (position, pair) in self.operations.windows(2).enumerate() {
            let produced = pair[0].output_kind();
            let expected = pair[1].input_kind();
            if produced != expected {
                return Err(OperationError::ChainTypeMismatch {
                    position: position + 1,
                    expected: expected.name(),
                    actual: produced.name(),
                });
            }
        }
        Ok(())
    }
}

/// Builder carrying the current output type as a phantom parameter.
pub struct ChainBuilder<Out> {
    operations: Vec<GraphOperation>,
    _out: PhantomData<fn() -> Out>,
}

impl<Out> ChainBuilder<Out> {
    /// Appends a step whose input type matches the chain's current output.
    pub fn then<Op>(mut self, op: Op) -> ChainBuilder<Op::Output>
    where
        Op: ChainStep<Input = Out>,
    {
        self.operations.push(op.into_operation());
        ChainBuilder {
            operations: self.operations,
            _out: PhantomData,
        }
    }

    pub fn build(self) -> OperationChain<Out> {
        OperationChain {
            operations: self.operations,
            _out: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntitySeed;

    #[test]
    fn typed_chain_builds_and_validates() {
        let chain = OperationChain::<Elements>::starting_with(GetAdjacentEntitySeeds::new([
            EntitySeed::new("1"),
        ]))
        .then(GetElements::new([]))
        .build();
        assert_eq!(chain.operations.len(), 2);
        chain.validate_wiring().unwrap();
    }

    #[test]
    fn untyped_mismatch_is_caught_at_runtime() {
        let chain = OperationChain::from_operations(vec![
            GraphOperation::GetAllElements(GetAllElements::new()),
            GraphOperation::GetAllElements(GetAllElements::new()),
        ]);
        let err = chain.validate_wiring().unwrap_err();
        assert!(matches!(
            err,
            OperationError::ChainTypeMismatch { position: 1, .. }
        ));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let chain = OperationChain::from_operations(vec![]);
        assert_eq!(chain.validate_wiring(), Err(OperationError::EmptyChain));
    }

    #[test]
    fn chain_json_round_trip() {
        let json = r#"{"operations": [
            {"class": "GetAdjacentEntitySeeds", "seeds": [{"entity": "1"}]},
            {"class": "GetElements"}
        ]}"#;
        let chain: OperationChain = serde_json::from_str(json).unwrap();
        chain.validate_wiring().unwrap();
        assert_eq!(chain.operations[0].kind(), "GetAdjacentEntitySeeds");
    }
}

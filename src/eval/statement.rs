use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{evaluator::EvalResult, expression::ExpressionEvaluator, value::TypedValue};
use crate::ast::{Node, Program};

/// One resolved node and its result.
#[derive(Debug, Clone)]
pub struct Step {
    pub node: Node,
    pub result: TypedValue,
}

/// Collects steps in completion order.
pub type StepRecorder = Mutex<Vec<Step>>;

pub(crate) fn record_step(steps: Option<&StepRecorder>, node: &Node, result: &TypedValue) {
    if let Some(Ok(mut steps)) = steps.map(|s| s.lock()) {
        steps.push(Step {
            node: node.clone(),
            result: result.clone(),
        });
    }
}

/// Evaluates top-level statements in order.
pub struct StatementEvaluator {
    pub expression_evaluator: Arc<ExpressionEvaluator>,
}

impl StatementEvaluator {
    pub fn new(expression_evaluator: Arc<ExpressionEvaluator>) -> Self {
        Self {
            expression_evaluator,
        }
    }

    pub async fn eval_statement(
        &self,
        statement: &Node,
        steps: Option<&StepRecorder>,
    ) -> EvalResult<TypedValue> {
        self.expression_evaluator
            .resolve(statement, None, steps)
            .await
    }

    /// Value of the last statement; void for an empty program.
    pub async fn eval_program(&self, program: &Program) -> EvalResult<TypedValue> {
        let mut last = TypedValue::void();
        for (i, statement) in program.iter().enumerate() {
            debug!("Evaluating statement {}", i);
            last = self.eval_statement(statement, None).await?;
        }
        Ok(last)
    }

    pub async fn eval_program_steps(&self, program: &Program) -> EvalResult<Vec<Step>> {
        let recorder = StepRecorder::default();
        for statement in program {
            self.eval_statement(statement, Some(&recorder)).await?;
        }
        Ok(recorder
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

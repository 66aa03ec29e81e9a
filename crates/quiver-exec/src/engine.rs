//! Batch execution driver.
//!
//! One call to [`Engine::execute_batch`] runs one RPC-sized slice of a
//! query: open (replaying any incoming resume snapshot), pull until the
//! batch fills or a worker pauses at its quota, snapshot if unfinished,
//! close. The compiled plan is shared and immutable; everything mutable
//! dies with the call.

use std::sync::Arc;

use quiver_core::config::{ExecConfig, ExecRole};
use quiver_core::error::Result;
use quiver_core::value::Value;
use quiver_ops::build::CompiledPlan;
use quiver_ops::context::RuntimeContext;
use quiver_ops::external::WorkerFactory;
use quiver_ops::iter;
use quiver_ops::resume::ResumeInfo;

/// Per-call knobs; everything unset falls back to the engine's config.
#[derive(Debug, Default, Clone)]
pub struct ExecOptions {
    pub role: Option<ExecRole>,
    pub batch_size: Option<usize>,
    pub resume: Option<ResumeInfo>,
}

/// One batch of results. `resume` is present exactly when the query is not
/// done; feeding it back continues where this batch stopped.
#[derive(Debug, Clone)]
pub struct Batch {
    pub results: Vec<Value>,
    pub resume: Option<ResumeInfo>,
    pub done: bool,
}

pub struct Engine {
    cfg: ExecConfig,
    factory: Arc<dyn WorkerFactory>,
}

impl Engine {
    pub fn new(cfg: ExecConfig, factory: Arc<dyn WorkerFactory>) -> Self {
        Self { cfg, factory }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.cfg
    }

    pub fn execute_batch(&self, plan: &CompiledPlan, opts: ExecOptions) -> Result<Batch> {
        let mut cfg = self.cfg.clone();
        if let Some(size) = opts.batch_size {
            cfg.batch_size = size;
        }
        let role = opts.role.unwrap_or(ExecRole::Server);
        let mut ctx = RuntimeContext::new(
            plan.reg_count,
            plan.state_count,
            &cfg,
            role,
            Arc::clone(&self.factory),
            opts.resume,
        );

        let root = &plan.root;
        if let Err(e) = iter::open(root, &mut ctx) {
            iter::close(root, &mut ctx);
            return Err(e);
        }

        let mut results = Vec::new();
        let outcome = loop {
            ctx.set_reached_limit(false);
            match iter::next(root, &mut ctx) {
                Ok(true) => {
                    results.push(ctx.reg(root.result_reg()).clone());
                    if results.len() >= cfg.batch_size {
                        break Ok(false);
                    }
                }
                Ok(false) => break Ok(!ctx.reached_limit()),
                Err(e) => break Err(e),
            }
        };
        let done = match outcome {
            Ok(done) => done,
            Err(e) => {
                iter::close(root, &mut ctx);
                return Err(e);
            }
        };

        let resume = if done {
            None
        } else {
            let mut info = ResumeInfo::new();
            if let Err(e) = iter::suspend(root, &mut ctx, &mut info) {
                iter::close(root, &mut ctx);
                return Err(e);
            }
            Some(info)
        };
        iter::close(root, &mut ctx);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            results = results.len(),
            done,
            peak_bytes = ctx.tracker().peak_bytes(),
            "batch finished"
        );

        Ok(Batch {
            results,
            resume,
            done,
        })
    }

    /// Drive a query to completion across as many batches as it takes.
    pub fn run_to_completion(&self, plan: &CompiledPlan, opts: ExecOptions) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        let mut next_opts = opts;
        loop {
            let batch = self.execute_batch(plan, next_opts.clone())?;
            all.extend(batch.results);
            if batch.done {
                return Ok(all);
            }
            next_opts.resume = batch.resume;
        }
    }
}

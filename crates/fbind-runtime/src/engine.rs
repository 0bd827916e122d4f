#![forbid(unsafe_code)]

//! Composition root.
//!
//! [`Engine`] builds the shared services from an [`EngineConfig`] and hands
//! them to every binding it creates. The host drives it: [`Engine::pump`]
//! after handling an event, [`Engine::tick`] once per frame.

use std::rc::Rc;

use fbind_core::Value;
use web_time::Instant;

use crate::ast::Expression;
use crate::binding::{Binding, BindingMode, ConnectQueue};
use crate::config::EngineConfig;
use crate::error::{BindingError, ParseError, TaskError};
use crate::flags::BindingFlags;
use crate::observation::{DirtyChecker, ObserverLocator};
use crate::parser::{ExpressionCache, ExpressionParser};
use crate::resources::Resources;
use crate::task_queue::TaskQueue;

pub struct Engine {
    config: EngineConfig,
    task_queue: Rc<TaskQueue>,
    dirty_checker: Rc<DirtyChecker>,
    locator: Rc<ObserverLocator>,
    resources: Rc<Resources>,
    connect_queue: Rc<ConnectQueue>,
    expressions: ExpressionCache,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_parser(config, None)
    }

    /// Engine whose expression cache falls back to `parser` on a miss.
    #[must_use]
    pub fn with_parser(config: EngineConfig, parser: Option<Rc<dyn ExpressionParser>>) -> Self {
        let task_queue = Rc::new(TaskQueue::new(&config));
        let dirty_checker = Rc::new(DirtyChecker::new(config.dirty_check_interval()));
        let locator = ObserverLocator::new(
            Rc::clone(&task_queue),
            Rc::clone(&dirty_checker),
            &config,
        );
        let expressions = match parser {
            Some(parser) => ExpressionCache::with_parser(parser),
            None => ExpressionCache::new(),
        };
        tracing::debug!(?config, "engine created");
        Self {
            connect_queue: Rc::new(ConnectQueue::new(&config.connect_queue)),
            config,
            task_queue,
            dirty_checker,
            locator,
            resources: Rc::new(Resources::with_defaults()),
            expressions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn task_queue(&self) -> &Rc<TaskQueue> {
        &self.task_queue
    }

    #[must_use]
    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.dirty_checker
    }

    #[must_use]
    pub fn locator(&self) -> &Rc<ObserverLocator> {
        &self.locator
    }

    #[must_use]
    pub fn resources(&self) -> &Rc<Resources> {
        &self.resources
    }

    #[must_use]
    pub fn connect_queue(&self) -> &Rc<ConnectQueue> {
        &self.connect_queue
    }

    #[must_use]
    pub fn expressions(&self) -> &ExpressionCache {
        &self.expressions
    }

    /// A new, unbound binding of `target[property]` to `expression`.
    #[must_use]
    pub fn create_binding(
        &self,
        expression: Rc<Expression>,
        target: Value,
        property: &str,
        mode: BindingMode,
    ) -> Rc<Binding> {
        Binding::new(
            expression,
            target,
            property,
            mode,
            Rc::clone(&self.locator),
            Rc::clone(&self.resources),
            Rc::clone(&self.connect_queue),
        )
    }

    /// Like [`Engine::create_binding`], resolving `text` through the
    /// expression cache.
    pub fn parse_binding(
        &self,
        text: &str,
        target: Value,
        property: &str,
        mode: BindingMode,
    ) -> Result<Rc<Binding>, ParseError> {
        let expression = self.expressions.parse(text)?;
        Ok(self.create_binding(expression, target, property, mode))
    }

    pub fn dispatch_signal(&self, name: &str) -> Result<(), BindingError> {
        self.resources
            .signaler()
            .dispatch_signal(name, BindingFlags::empty())
    }

    /// Flush microtasks, then macrotasks.
    pub fn pump(&self) -> Result<(), TaskError> {
        self.task_queue.pump()
    }

    /// One host frame: run a due dirty check, drain deferred connects within
    /// the frame budget, then pump. Returns whether connects remain queued.
    ///
    /// Failures from the check or the connects are reported as uncaught and
    /// surface from the pump.
    pub fn tick(&self, now: Instant) -> Result<bool, TaskError> {
        let _span = tracing::trace_span!("engine.tick").entered();
        if let Err(error) = self.dirty_checker.poll(now) {
            self.task_queue.report_uncaught(error);
        }
        let remaining = match self.connect_queue.flush(now) {
            Ok(remaining) => remaining,
            Err(error) => {
                self.task_queue.report_uncaught(error);
                !self.connect_queue.is_empty()
            }
        };
        self.pump()?;
        Ok(remaining)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("dirty_checked", &self.dirty_checker.tracked_len())
            .field("connect_queue", &self.connect_queue)
            .finish()
    }
}

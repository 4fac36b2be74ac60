//! El flow runtime: el bucle de disponibilidad que conduce un flujo a
//! término (§4.8, §5).
//!
//! Un task lógico por flujo activo. Se suscribe a su propio aggregate en el
//! event log y, en cada evento de interés (`attribute_set`,
//! `step_completed`/`step_failed`/`step_skipped`), reevalúa qué steps
//! pendientes pasaron a estar listos y los despacha respetando
//! `WorkConfig.parallelism` vía un semáforo por step. El propio bucle cierra
//! sobre sí mismo: cada dispatch emite eventos al mismo log al que está
//! suscrito, así que sus propios efectos son lo siguiente que observa.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

use flowgraph_attributes::Role;

use crate::dispatcher::{
    evaluate_predicate, fan_out, is_ready, materialize_args, translate_outputs, DispatchMetadata, HandlerResolver,
    ScriptRunner,
};
use crate::errors::DispatchError;
use crate::event::{AggregateId, EventKind, EventStore};
use crate::ids::{FlowId, StepId, Token};
use crate::model::Step;
use crate::planner::ExecutionPlan;
use crate::retry_policy::RetryPolicy;
use crate::state::{ExecutionStatus, FlowState, FlowStatus};

/// Conduce un único flujo hasta un estado terminal. Construido por el
/// llamador (la fachada externa, fuera de alcance de este crate) una vez por
/// flujo lanzado.
pub struct FlowRuntime<E: EventStore + 'static> {
    event_store: Arc<E>,
    handlers: Arc<dyn HandlerResolver>,
    scripts: Arc<dyn ScriptRunner>,
    retry: Arc<dyn RetryPolicy>,
}

impl<E: EventStore + 'static> FlowRuntime<E> {
    pub fn new(
        event_store: Arc<E>,
        handlers: Arc<dyn HandlerResolver>,
        scripts: Arc<dyn ScriptRunner>,
        retry: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self { event_store, handlers, scripts, retry }
    }

    /// Arranca el flujo y lo conduce hasta `completed` o `failed`,
    /// devolviendo la proyección final. `cancel` se observa en cada
    /// iteración del bucle; marcarlo `true` dispara la cancelación (§4.8
    /// punto 4, idempotente).
    pub async fn run(
        self: Arc<Self>,
        flow_id: FlowId,
        plan: ExecutionPlan,
        initial_args: IndexMap<String, Value>,
        labels: HashMap<String, String>,
        mut cancel: watch::Receiver<bool>,
    ) -> Arc<FlowState> {
        let flow_agg = AggregateId::Flow(flow_id.clone());

        let started = self.event_store.append(flow_agg.clone(), EventKind::FlowStarted { goals: plan.goals.clone() });
        let mut state = Arc::new(FlowState::initial(flow_id.clone(), &plan, &initial_args, labels, Utc::now()));
        state = state.apply(&started);

        // A goal whose outputs are entirely in initial_args completes the
        // flow immediately with no executions to run at all (§8 boundary).
        if plan.steps.is_empty() {
            let completed = self.event_store.append(flow_agg.clone(), EventKind::FlowCompleted);
            return state.apply(&completed);
        }

        let activated = self.event_store.append(flow_agg.clone(), EventKind::FlowActivated);
        state = state.apply(&activated);

        let semaphores: HashMap<StepId, Arc<Semaphore>> = plan
            .steps
            .iter()
            .map(|(id, step)| (id.clone(), Arc::new(Semaphore::new(step.work_config.parallelism.max(1)))))
            .collect();

        let mut dispatched: HashSet<StepId> = HashSet::new();
        let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();
        let mut subscription = self.event_store.subscribe(crate::event::Filter {
            aggregate_prefix: flow_agg.as_path(),
            event_types: None,
            from_sequence: 0,
        });

        self.dispatch_newly_ready(&flow_id, &plan, &state, &semaphores, &mut dispatched, &mut tasks);

        loop {
            if *cancel.borrow() {
                return self.cancel_flow(&flow_id, state, &tasks).await;
            }

            tokio::select! {
                biased;
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return self.cancel_flow(&flow_id, state, &tasks).await;
                    }
                }
                received = subscription.recv() => {
                    match received {
                        Ok(Some(event)) => {
                            state = state.apply(&event);
                            self.dispatch_newly_ready(&flow_id, &plan, &state, &semaphores, &mut dispatched, &mut tasks);
                            if let Some(terminal) = self.check_termination(&plan, &state) {
                                let ev = self.event_store.append(flow_agg.clone(), terminal);
                                return state.apply(&ev);
                            }
                        }
                        Ok(None) => return state,
                        Err(crate::event::SubscriberLagged) => {
                            warn!(flow_id = %flow_id, "subscriber lagged behind the event log");
                            return state;
                        }
                    }
                }
            }
        }
    }

    /// Cancela el flujo: ningún evento más debe salir de los tasks en vuelo,
    /// así que se abortan directamente en vez de esperarlos (§4.7 "no
    /// further retry_scheduled or work_* events", §4.8 punto 4). Abortar el
    /// task de `run_step` deja caer su `JoinSet` interno, que a su vez
    /// aborta cada work item (y el sleep de retry en curso, si lo hay).
    async fn cancel_flow(
        &self,
        flow_id: &FlowId,
        state: Arc<FlowState>,
        tasks: &[tokio::task::JoinHandle<()>],
    ) -> Arc<FlowState> {
        for task in tasks {
            task.abort();
        }
        let flow_agg = AggregateId::Flow(flow_id.clone());
        let deactivated =
            self.event_store.append(flow_agg.clone(), EventKind::FlowDeactivated { reason: "cancelled".to_string() });
        let state = state.apply(&deactivated);
        let failed = self.event_store.append(flow_agg, EventKind::FlowFailed { error: "cancelled".to_string() });
        state.apply(&failed)
    }

    /// `FlowStatus = completed` iff every goal is completed or its required
    /// attributes are already supplied and nothing is in a non-terminal
    /// state; `failed` iff some execution failed terminally with no
    /// alternative producer path to any goal (§3 invariant).
    fn check_termination(&self, plan: &ExecutionPlan, state: &FlowState) -> Option<EventKind> {
        let all_terminal = plan.steps.keys().all(|id| {
            state.executions.get(id).map(|e| e.status.is_terminal()).unwrap_or(false)
        });
        if !all_terminal {
            return None;
        }
        let goals_satisfied = plan.goals.iter().all(|g| {
            state
                .executions
                .get(g)
                .map(|e| matches!(e.status, ExecutionStatus::Completed | ExecutionStatus::Skipped))
                .unwrap_or(false)
        });
        if goals_satisfied {
            Some(EventKind::FlowCompleted)
        } else {
            Some(EventKind::FlowFailed { error: "one or more steps failed".to_string() })
        }
    }

    fn dispatch_newly_ready(
        &self,
        flow_id: &FlowId,
        plan: &ExecutionPlan,
        state: &Arc<FlowState>,
        semaphores: &HashMap<StepId, Arc<Semaphore>>,
        dispatched: &mut HashSet<StepId>,
        tasks: &mut Vec<tokio::task::JoinHandle<()>>,
    ) {
        let mut ids: Vec<&StepId> = plan.steps.keys().collect();
        ids.sort();
        for id in ids {
            if dispatched.contains(id) {
                continue;
            }
            let pending = state.executions.get(id).map(|e| e.status == ExecutionStatus::Pending).unwrap_or(false);
            if !pending {
                continue;
            }
            let step = plan.steps.get(id).expect("plan step present");
            if let Some(reason) = cascade_blocked(step, plan, state) {
                self.event_store.append(
                    AggregateId::Step(flow_id.clone(), id.clone()),
                    EventKind::StepFailed { step_id: id.clone(), error: reason.to_string() },
                );
                dispatched.insert(id.clone());
                continue;
            }
            if !is_ready(step, state) {
                continue;
            }
            dispatched.insert(id.clone());
            let this = self.clone_handle();
            let flow_id = flow_id.clone();
            let step = step.clone();
            let state = state.clone();
            let semaphore = semaphores.get(id).expect("semaphore present for plan step").clone();
            let handle = tokio::spawn(async move { this.run_step(flow_id, step, state, semaphore).await });
            tasks.push(handle);
        }
    }

    fn clone_handle(&self) -> Arc<Self> {
        // FlowRuntime is always held behind an Arc by callers of `run`;
        // dispatch needs its own handle to spawn detached per-step tasks.
        Arc::new(Self {
            event_store: self.event_store.clone(),
            handlers: self.handlers.clone(),
            scripts: self.scripts.clone(),
            retry: self.retry.clone(),
        })
    }

    async fn run_step(self: Arc<Self>, flow_id: FlowId, step: Step, state: Arc<FlowState>, semaphore: Arc<Semaphore>) {
        let step_agg = AggregateId::Step(flow_id.clone(), step.id.clone());
        self.event_store.append(step_agg.clone(), EventKind::StepStarted { step_id: step.id.clone() });

        let args = match materialize_args(&step, &state, self.scripts.as_ref()) {
            Ok(a) => a,
            Err(e) => {
                self.event_store.append(
                    step_agg,
                    EventKind::StepFailed { step_id: step.id.clone(), error: e.to_string() },
                );
                return;
            }
        };
        let args_value = Value::Object(args.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        match evaluate_predicate(&step, &args_value, self.scripts.as_ref()) {
            Ok(true) => {}
            Ok(false) => {
                self.event_store.append(
                    step_agg,
                    EventKind::StepSkipped { step_id: step.id.clone(), reason: "predicate".to_string() },
                );
                return;
            }
            Err(e) => {
                self.event_store.append(
                    step_agg,
                    EventKind::StepFailed { step_id: step.id.clone(), error: e.to_string() },
                );
                return;
            }
        }

        let items = fan_out(&step, &args);
        if items.is_empty() {
            // for_each over an empty array: zero work items, empty outputs.
            self.event_store.append(step_agg, EventKind::StepCompleted { step_id: step.id.clone() });
            return;
        }

        let mut join_set = JoinSet::new();
        for item in items {
            let this = self.clone();
            let flow_id = flow_id.clone();
            let step = step.clone();
            let permit_sem = semaphore.clone();
            join_set.spawn(async move {
                let _permit = permit_sem.acquire_owned().await.expect("semaphore not closed");
                this.run_work_item(flow_id, step, item.token, item.args).await
            });
        }

        let mut any_failed = false;
        let mut outputs_by_attr: IndexMap<String, Vec<Value>> = IndexMap::new();
        let mut single_outputs: Option<IndexMap<String, Value>> = None;
        let fan_out_count = step.for_each_inputs().count();

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(Ok(outputs)) => {
                    if fan_out_count == 0 {
                        single_outputs = Some(outputs);
                    } else {
                        for (k, v) in outputs {
                            outputs_by_attr.entry(k).or_default().push(v);
                        }
                    }
                }
                Ok(Err(_)) => any_failed = true,
                Err(join_err) => {
                    warn!(error = %join_err, "work item task panicked");
                    any_failed = true;
                }
            }
        }

        if any_failed {
            self.event_store.append(
                AggregateId::Step(flow_id.clone(), step.id.clone()),
                EventKind::StepFailed { step_id: step.id.clone(), error: "one or more work items failed".to_string() },
            );
            return;
        }

        let merged = single_outputs.unwrap_or_else(|| {
            outputs_by_attr.into_iter().map(|(k, v)| (k, Value::Array(v))).collect()
        });
        for (name, value) in merged {
            self.event_store.append(
                AggregateId::Flow(flow_id.clone()),
                EventKind::AttributeSet { name, value, produced_by: step.id.clone() },
            );
        }
        self.event_store.append(
            AggregateId::Step(flow_id.clone(), step.id.clone()),
            EventKind::StepCompleted { step_id: step.id.clone() },
        );
    }

    /// Ejecuta un único work item hasta su resolución terminal, incluyendo
    /// los reintentos gobernados por `RetryPolicy` (§4.7). Devuelve los
    /// outputs traducidos a nombres internos en éxito.
    async fn run_work_item(
        self: Arc<Self>,
        flow_id: FlowId,
        step: Step,
        token: Token,
        args: Value,
    ) -> Result<IndexMap<String, Value>, DispatchError> {
        let work_agg = AggregateId::Work(flow_id.clone(), step.id.clone(), token.clone());
        let mut retry_count: u32 = 0;

        loop {
            self.event_store.append(
                work_agg.clone(),
                EventKind::WorkStarted { step_id: step.id.clone(), token: token.clone(), inputs: args.clone() },
            );

            let handler = self.handlers.resolve(&step);
            let outcome = match handler {
                Some(h) => {
                    let meta = DispatchMetadata {
                        flow_id: flow_id.clone(),
                        step_id: step.id.clone(),
                        work_token: token.clone(),
                        receipt_token: None,
                        webhook_url: step.http.as_ref().and_then(|h| h.webhook_url.clone()),
                        parent_flow_id: None,
                        parent_step_id: None,
                        parent_work_item_token: None,
                    };
                    h.invoke(&step, args.clone(), meta).await
                }
                None => Err(DispatchError::ScriptError("no handler registered for this step type".to_string())),
            };

            match outcome {
                Ok(o) if o.success => {
                    let outputs = translate_outputs(&step, &o.outputs, self.scripts.as_ref())?;
                    self.event_store.append(
                        work_agg,
                        EventKind::WorkCompleted { step_id: step.id.clone(), token: token.clone(), outputs: o.outputs },
                    );
                    return Ok(outputs);
                }
                Ok(o) => {
                    let error = o.error.unwrap_or_else(|| "handler reported failure".to_string());
                    if self.retry_or_fail(&flow_id, &step, &token, retry_count, &error).await {
                        retry_count += 1;
                        continue;
                    }
                    return Err(DispatchError::HandlerReportedFailure(Some(error)));
                }
                Err(e) => {
                    if self.retry_or_fail(&flow_id, &step, &token, retry_count, &e.to_string()).await {
                        retry_count += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Emite `work_failed`, y decide si queda reintento (emitiendo
    /// `retry_scheduled` y durmiendo el delay) o si el work item es
    /// terminalmente `failed`. Devuelve `true` si se debe reintentar.
    async fn retry_or_fail(&self, flow_id: &FlowId, step: &Step, token: &Token, retry_count: u32, error: &str) -> bool {
        let work_agg = AggregateId::Work(flow_id.clone(), step.id.clone(), token.clone());
        match self.retry.next_delay(&step.work_config, retry_count) {
            Some(delay) => {
                self.event_store.append(
                    work_agg.clone(),
                    EventKind::WorkFailed {
                        step_id: step.id.clone(),
                        token: token.clone(),
                        error: error.to_string(),
                        retryable: true,
                    },
                );
                let next_attempt_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
                self.event_store.append(
                    work_agg,
                    EventKind::RetryScheduled {
                        step_id: step.id.clone(),
                        token: token.clone(),
                        attempt: retry_count + 1,
                        next_attempt_at,
                    },
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                true
            }
            None => {
                self.event_store.append(
                    work_agg,
                    EventKind::WorkFailed {
                        step_id: step.id.clone(),
                        token: token.clone(),
                        error: error.to_string(),
                        retryable: false,
                    },
                );
                false
            }
        }
    }
}

/// Un step con un input `required` cuyo(s) productor(es) quedaron todos
/// terminales sin escribir el atributo (todos `skipped`, todos `failed`, o
/// una mezcla de ambos) no puede volverse listo jamás — no hay camino
/// alternativo de productor (§3 invariant de `failed`, §7 "a flow always
/// reaches a terminal status within finite time"). Cascada a `failed` con
/// `Error = "upstream_skipped"` si algún productor fue `skipped`, o
/// `"upstream_failed"` si todos fallaron sin ninguno `skipped`; un
/// dependiente sólo `optional` de esos outputs sigue su curso normal (§8
/// escenario 4, decisión de Open Question #3 en DESIGN.md, extendida al
/// caso puramente-`failed`).
fn cascade_blocked(step: &Step, plan: &ExecutionPlan, state: &FlowState) -> Option<&'static str> {
    let mut any_skipped = false;
    let mut any_failed = false;
    let blocked = step.required_and_optional_inputs().filter(|a| a.role == Role::Required).any(|input| {
        if state.attributes.contains_key(&input.name) {
            return false;
        }
        let Some(providers) = plan.attributes.get(&input.name) else { return false };
        if providers.producers.is_empty() {
            return false;
        }
        let all_terminal_without_output = providers.producers.iter().all(|p| {
            matches!(
                state.executions.get(p).map(|e| e.status),
                Some(ExecutionStatus::Skipped) | Some(ExecutionStatus::Failed)
            )
        });
        if all_terminal_without_output {
            for p in &providers.producers {
                match state.executions.get(p).map(|e| e.status) {
                    Some(ExecutionStatus::Skipped) => any_skipped = true,
                    Some(ExecutionStatus::Failed) => any_failed = true,
                    _ => {}
                }
            }
        }
        all_terminal_without_output
    });
    if !blocked {
        return None;
    }
    Some(if any_skipped { "upstream_skipped" } else if any_failed { "upstream_failed" } else { "upstream_skipped" })
}

/// Arranca un runtime de flujo nuevo en un task separado; devuelve el canal
/// de cancelación y un `JoinHandle` que resuelve al `FlowState` final. Helper
/// de conveniencia para el binario de demostración y para tests.
pub fn spawn_flow<E: EventStore + 'static>(
    runtime: Arc<FlowRuntime<E>>,
    flow_id: FlowId,
    plan: ExecutionPlan,
    initial_args: IndexMap<String, Value>,
    labels: HashMap<String, String>,
) -> (watch::Sender<bool>, tokio::task::JoinHandle<Arc<FlowState>>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { runtime.run(flow_id, plan, initial_args, labels, rx).await });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowgraph_attributes::{AttrType, AttributeSpec, Role};

    use crate::catalog::StepCatalog;
    use crate::dispatcher::{Handler, HandlerOutcome, NoopScriptRunner};
    use crate::event::InMemoryEventStore;
    use crate::model::{HttpConfig, StepType, WorkConfig};

    struct AlwaysSucceeds;
    #[async_trait]
    impl Handler for AlwaysSucceeds {
        async fn invoke(
            &self,
            step: &Step,
            args: Value,
            _meta: DispatchMetadata,
        ) -> Result<HandlerOutcome, DispatchError> {
            let mut outputs = serde_json::Map::new();
            for out in step.outputs() {
                let v = args.get("x").cloned().unwrap_or(Value::Number(0.into()));
                outputs.insert(out.external_name().to_string(), v);
            }
            Ok(HandlerOutcome { success: true, outputs: Value::Object(outputs), error: None })
        }
    }

    struct FixedResolver(Arc<dyn Handler>);
    impl HandlerResolver for FixedResolver {
        fn resolve(&self, _step: &Step) -> Option<Arc<dyn Handler>> {
            Some(self.0.clone())
        }
    }

    struct ImmediateFail;
    impl RetryPolicy for ImmediateFail {
        fn next_delay(&self, _wc: &WorkConfig, _retry_count: u32) -> Option<Duration> {
            None
        }
    }

    fn step_b() -> Step {
        Step {
            id: StepId::new("b"),
            name: "b".into(),
            step_type: StepType::Sync,
            attributes: vec![
                AttributeSpec::new("x", Role::Required, AttrType::Number),
                AttributeSpec::new("y", Role::Output, AttrType::Number),
            ],
            http: Some(HttpConfig { endpoint: "http://x".into(), timeout_ms: 1000, webhook_url: None }),
            script: None,
            flow: None,
            predicate: None,
            work_config: WorkConfig::default(),
            labels: Default::default(),
            memoizable: false,
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl Handler for AlwaysFails {
        async fn invoke(
            &self,
            _step: &Step,
            _args: Value,
            _meta: DispatchMetadata,
        ) -> Result<HandlerOutcome, DispatchError> {
            Err(DispatchError::HandlerReportedFailure(Some("boom".to_string())))
        }
    }

    struct SlowRetry;
    impl RetryPolicy for SlowRetry {
        fn next_delay(&self, _wc: &WorkConfig, retry_count: u32) -> Option<Duration> {
            if retry_count >= 3 {
                None
            } else {
                Some(Duration::from_millis(150))
            }
        }
    }

    #[tokio::test]
    async fn cancelling_a_retrying_flow_stops_further_work_and_retry_events() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = StepCatalog::new(store.clone());
        catalog.register(step_b()).unwrap();

        let mut init = IndexMap::new();
        init.insert("x".to_string(), Value::from(1));
        let plan = crate::planner::plan(&[StepId::new("b")], &init, &catalog).unwrap();

        let handlers: Arc<dyn HandlerResolver> = Arc::new(FixedResolver(Arc::new(AlwaysFails)));
        let runtime = Arc::new(FlowRuntime::new(store.clone(), handlers, Arc::new(NoopScriptRunner), Arc::new(SlowRetry)));

        let (tx, rx) = watch::channel(false);
        let flow_id = FlowId::sanitize("f1").unwrap();
        let handle = tokio::spawn(runtime.run(flow_id, plan, init, HashMap::new(), rx));

        // Let the first attempt fail and its retry timer start sleeping
        // (150ms), then cancel while it's still parked in the backoff.
        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(true).unwrap();

        let state = handle.await.unwrap();
        assert_eq!(state.status, FlowStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("cancelled"));

        let count_at_cancel = store.list(&[]).len();
        // Past when the aborted retry would have fired its second attempt
        // had it not been cancelled.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(store.list(&[]).len(), count_at_cancel, "no further work_* or retry_scheduled events after cancellation");
    }

    #[tokio::test]
    async fn linear_flow_completes_with_supplied_initial_input() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = StepCatalog::new(store.clone());
        catalog.register(step_b()).unwrap();

        let mut init = IndexMap::new();
        init.insert("x".to_string(), Value::from(42));
        let plan = crate::planner::plan(&[StepId::new("b")], &init, &catalog).unwrap();

        let handlers: Arc<dyn HandlerResolver> = Arc::new(FixedResolver(Arc::new(AlwaysSucceeds)));
        let runtime = Arc::new(FlowRuntime::new(store, handlers, Arc::new(NoopScriptRunner), Arc::new(ImmediateFail)));

        let (_tx, rx) = watch::channel(false);
        let flow_id = FlowId::sanitize("f1").unwrap();
        let state = runtime.run(flow_id, plan, init, HashMap::new(), rx).await;

        assert_eq!(state.status, FlowStatus::Completed);
        assert_eq!(state.attributes.get("y").unwrap().value, Value::from(42));
    }
}

use crate::admission::AdmissionGate;
use crate::call::Classify;
use crate::error::ThrottleError;
use crate::store::StateStore;
use crate::telemetry::{NullSink, TelemetrySink};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that holds every request at an [`AdmissionGate`] before it reaches the inner service.
pub struct ThrottleLayer<S, K = NullSink> {
    gate: AdmissionGate<S, K>,
}

impl<S, K> Clone for ThrottleLayer<S, K> {
    fn clone(&self) -> Self {
        Self { gate: self.gate.clone() }
    }
}

impl<S, K> std::fmt::Debug for ThrottleLayer<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleLayer").field("gate", &self.gate).finish()
    }
}

impl<S, K> ThrottleLayer<S, K> {
    pub fn new(gate: AdmissionGate<S, K>) -> Self {
        Self { gate }
    }

    /// The shared gate; toggling it affects every service this layer has produced.
    pub fn gate(&self) -> &AdmissionGate<S, K> {
        &self.gate
    }
}

impl<Svc, S, K> Layer<Svc> for ThrottleLayer<S, K> {
    type Service = ThrottleService<Svc, S, K>;

    fn layer(&self, service: Svc) -> Self::Service {
        ThrottleService { inner: service, gate: self.gate.clone() }
    }
}

/// Middleware service produced by [`ThrottleLayer`].
pub struct ThrottleService<Svc, S, K = NullSink> {
    inner: Svc,
    gate: AdmissionGate<S, K>,
}

impl<Svc: Clone, S, K> Clone for ThrottleService<Svc, S, K> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), gate: self.gate.clone() }
    }
}

impl<Svc: std::fmt::Debug, S, K> std::fmt::Debug for ThrottleService<Svc, S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleService")
            .field("inner", &self.inner)
            .field("gate", &self.gate)
            .finish()
    }
}

impl<Svc, S, K, Req> Service<Req> for ThrottleService<Svc, S, K>
where
    Svc: Service<Req> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Error: Send + 'static,
    S: StateStore + 'static,
    K: TelemetrySink,
    K::Future: Send + 'static,
    Req: Classify + Send + 'static,
{
    type Response = Svc::Response;
    type Error = ThrottleError<Svc::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ThrottleError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let gate = self.gate.clone();
        // The readied instance goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let call = req.outbound_call();
            gate.acquire(&call).await?;
            inner.call(req).await.map_err(ThrottleError::Inner)
        })
    }
}

//! Service registry for dispatching requests by service and method name.
//!
//! The registry maps `(service, method)` pairs to handlers. It is
//! populated before the server starts and read-only afterwards; there is
//! no dynamic registration mid-call.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::{Result, WirecallError};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for method handlers operating on raw payload bytes.
pub trait RawHandler: Send + Sync + 'static {
    /// Handle a request payload, producing the response payload.
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Result<Bytes>>;
}

/// Wrapper that deserializes the request and serializes the response
/// around a typed handler function.
pub struct TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(Req) -> Fut>,
}

impl<F, Req, Resp, Fut> TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Req, Resp, Fut> RawHandler for TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Result<Bytes>> {
        let request: Req = match MsgPackCodec::decode(&payload) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(request);
        Box::pin(async move {
            let response = fut.await?;
            Ok(Bytes::from(MsgPackCodec::encode(&response)?))
        })
    }
}

/// Registry mapping `(service, method)` to handlers.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, HashMap<String, Box<dyn RawHandler>>>,
}

impl ServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed method handler. The request payload is decoded
    /// with MessagePack and the response encoded the same way.
    pub fn register<F, Req, Resp, Fut>(&mut self, service: &str, method: &str, handler: F)
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        self.register_raw(service, method, TypedHandler::new(handler));
    }

    /// Register a handler operating on raw payload bytes.
    pub fn register_raw(&mut self, service: &str, method: &str, handler: impl RawHandler) {
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(method.to_string(), Box::new(handler));
    }

    /// Look up a handler.
    pub fn lookup(&self, service: &str, method: &str) -> Option<&dyn RawHandler> {
        self.services
            .get(service)
            .and_then(|methods| methods.get(method))
            .map(|h| h.as_ref())
    }

    /// Invoke the handler for a request, or fail with `UnknownMethod`.
    pub async fn dispatch(&self, service: &str, method: &str, payload: Bytes) -> Result<Bytes> {
        let handler = self
            .lookup(service, method)
            .ok_or_else(|| WirecallError::UnknownMethod {
                service: service.to_string(),
                method: method.to_string(),
            })?;

        handler.call(payload).await
    }

    /// Total number of registered methods.
    pub fn method_count(&self) -> usize {
        self.services.values().map(HashMap::len).sum()
    }

    /// Check if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.method_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_raw(payload: Bytes) -> Result<Bytes> {
        Ok(payload)
    }

    struct EchoRawHandler;

    impl RawHandler for EchoRawHandler {
        fn call(&self, payload: Bytes) -> BoxFuture<'static, Result<Bytes>> {
            Box::pin(echo_raw(payload))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ServiceRegistry::new();
        registry.register_raw("Echo", "Echo", EchoRawHandler);

        assert!(registry.lookup("Echo", "Echo").is_some());
        assert!(registry.lookup("Echo", "Missing").is_none());
        assert!(registry.lookup("Missing", "Echo").is_none());
        assert_eq!(registry.method_count(), 1);
        assert!(!registry.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_raw_handler() {
        let mut registry = ServiceRegistry::new();
        registry.register_raw("Echo", "Echo", EchoRawHandler);

        let response = registry
            .dispatch("Echo", "Echo", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(response, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let registry = ServiceRegistry::new();

        let result = registry.dispatch("Nope", "Nothing", Bytes::new()).await;
        assert!(matches!(
            result,
            Err(WirecallError::UnknownMethod { service, method })
                if service == "Nope" && method == "Nothing"
        ));
    }

    #[tokio::test]
    async fn test_typed_handler_roundtrip() {
        use serde::{Deserialize, Serialize};

        #[derive(Serialize, Deserialize)]
        struct AddRequest {
            a: i64,
            b: i64,
        }

        #[derive(Serialize, Deserialize)]
        struct AddResponse {
            sum: i64,
        }

        let mut registry = ServiceRegistry::new();
        registry.register("Calc", "Add", |req: AddRequest| async move {
            Ok(AddResponse { sum: req.a + req.b })
        });

        let payload = Bytes::from(MsgPackCodec::encode(&AddRequest { a: 40, b: 2 }).unwrap());
        let raw = registry.dispatch("Calc", "Add", payload).await.unwrap();

        let response: AddResponse = MsgPackCodec::decode(&raw).unwrap();
        assert_eq!(response.sum, 42);
    }

    #[tokio::test]
    async fn test_typed_handler_bad_request_payload() {
        let mut registry = ServiceRegistry::new();
        registry.register("Calc", "Add", |req: i64| async move { Ok(req + 1) });

        let result = registry
            .dispatch("Calc", "Add", Bytes::from_static(b"\xc1garbage"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let mut registry = ServiceRegistry::new();
        registry.register("Calc", "Div", |(a, b): (i64, i64)| async move {
            if b == 0 {
                Err(WirecallError::Remote("division by zero".to_string()))
            } else {
                Ok(a / b)
            }
        });

        let payload = Bytes::from(MsgPackCodec::encode(&(1i64, 0i64)).unwrap());
        let result = registry.dispatch("Calc", "Div", payload).await;
        assert!(matches!(result, Err(WirecallError::Remote(_))));
    }

    #[test]
    fn test_multiple_services() {
        let mut registry = ServiceRegistry::new();
        registry.register_raw("Echo", "Echo", EchoRawHandler);
        registry.register_raw("Echo", "Reverse", EchoRawHandler);
        registry.register_raw("Store", "Get", EchoRawHandler);

        assert_eq!(registry.method_count(), 3);
        assert!(registry.lookup("Echo", "Reverse").is_some());
        assert!(registry.lookup("Store", "Get").is_some());
    }
}

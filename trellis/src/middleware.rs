//! Middleware registration through the container.
//!
//! Middlewares are addressed by string key: each configured entry ends up bound under
//! `"middlewares.<key>"` as a shared instance, so any part of the application can resolve a
//! [MiddlewarePtr] by name. An entry is either a ready-made instance or a container binding
//! resolved at boot time.

use crate::application::Application;
use crate::provider::ServiceProvider;
use derive_more::Constructor;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use trellis_container::binding::BindingKey;
use trellis_container::instance::{convert_error, AnyInstancePtr, ErrorPtr};

/// Handler capability every middleware exposes.
pub trait Middleware: Send + Sync {
    fn handle(&self, request: AnyInstancePtr) -> Result<AnyInstancePtr, ErrorPtr>;
}

pub type MiddlewarePtr = Arc<dyn Middleware>;

/// A configured middleware: ready-made, or a container binding holding a [MiddlewarePtr].
#[derive(Clone)]
pub enum MiddlewareRegistration {
    Instance(MiddlewarePtr),
    Binding(BindingKey),
}

#[derive(Error, Debug)]
pub enum MiddlewareError {
    #[error("Middleware binding '{0}' is not resolvable")]
    UnresolvedBinding(String),
}

/// Binding key for a registered middleware.
pub fn middleware_binding(key: &str) -> BindingKey {
    BindingKey::named(format!("middlewares.{key}"))
}

/// Publishes the configured middlewares into the container, keeping declaration order.
#[derive(Constructor, Default)]
pub struct MiddlewareServiceProvider {
    middlewares: Vec<(String, MiddlewareRegistration)>,
}

impl MiddlewareServiceProvider {
    fn add_middleware(
        app: &mut Application,
        key: &str,
        registration: &MiddlewareRegistration,
    ) -> Result<(), ErrorPtr> {
        let middleware: MiddlewarePtr = match registration {
            MiddlewareRegistration::Instance(instance) => instance.clone(),
            MiddlewareRegistration::Binding(binding) => app
                .container_mut()
                .make::<MiddlewarePtr>(binding)?
                .map(|resolved| resolved.as_ref().clone())
                .ok_or_else(|| {
                    convert_error(MiddlewareError::UnresolvedBinding(binding.to_string()))
                })?,
        };

        app.container_mut()
            .instance(middleware_binding(key), middleware);
        debug!("Registered middleware {key}");
        Ok(())
    }
}

impl ServiceProvider for MiddlewareServiceProvider {
    fn name(&self) -> &'static str {
        "MiddlewareServiceProvider"
    }

    fn boot<'a>(&'a mut self, app: &'a mut Application) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            for (key, registration) in &self.middlewares {
                Self::add_middleware(app, key, registration)?;
            }

            Ok(())
        }
        .boxed()
    }
}

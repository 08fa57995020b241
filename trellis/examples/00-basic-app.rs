use config::Value;
use futures::future::BoxFuture;
use futures::FutureExt;
use trellis::application;
use trellis::application::Application;
use trellis::bootstrap::{
    BootProviders, Bootstrapper, LoadConfiguration, LoadEnvironment, RegisterProviders,
};
use trellis::config::ConfigRepository;
use trellis::provider::ServiceProvider;
use trellis_container::binding::{BindingKey, Producer};
use trellis_container::instance::ErrorPtr;

// a provider binds its services during register and wires them during boot
struct GreetingProvider;

impl ServiceProvider for GreetingProvider {
    fn name(&self) -> &'static str {
        "GreetingProvider"
    }

    fn register<'a>(
        &'a mut self,
        app: &'a mut Application,
    ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            let greeting = app
                .config_string("app.greeting")
                .unwrap_or_else(|| "Hello".to_string());
            app.bind(BindingKey::named("greeting"), Producer::value(greeting), false);
            Ok(())
        }
        .boxed()
    }

    fn boot<'a>(&'a mut self, app: &'a mut Application) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            let greeting = app.make_or(&BindingKey::named("greeting"), String::new())?;

            // prints "Hello world!"
            println!("{greeting} world!");
            Ok(())
        }
        .boxed()
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
#[tokio::main]
async fn main() {
    let mut app = application::create_default().expect("unable to create default application");

    // configuration usually comes from the config directory; assembled in code here
    let mut repository = ConfigRepository::new();
    repository.insert_section(
        "app",
        Value::from(
            [("greeting".to_string(), Value::from("Hello"))]
                .into_iter()
                .collect::<std::collections::HashMap<_, _>>(),
        ),
    );

    let mut sequence: Vec<Box<dyn Bootstrapper>> = vec![
        Box::new(LoadEnvironment),
        Box::new(LoadConfiguration::with_repository(repository)),
        Box::new(RegisterProviders::new(vec![Box::new(GreetingProvider)])),
        Box::new(BootProviders),
    ];

    app.bootstrap_with(&mut sequence)
        .await
        .expect("error bootstrapping application");
}

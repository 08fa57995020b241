use std::sync::Arc;
use trellis_container::binding::{BindingKey, Producer};
use trellis_container::container::Container;
use trellis_container::instance::AnyInstancePtr;
use trellis_container::invoker::{sync_handler, Arguments, MethodBinding, ParameterSpec};

struct Mailer;

impl Mailer {
    fn send(&self, recipient: &str, body: &str) -> String {
        format!("to {recipient}: {body}")
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
#[tokio::main]
async fn main() {
    let mut container = Container::new();
    container.instance(BindingKey::of::<Mailer>(), Mailer);
    container.bind(
        BindingKey::named("mail.body"),
        Producer::value("hello".to_string()),
        false,
    );

    // "Mailer@send" declares its parameters explicitly; "body" falls back to a container binding
    container
        .bind_method(
            "Mailer@send",
            MethodBinding {
                target: BindingKey::of::<Mailer>(),
                parameters: vec![
                    ParameterSpec::new("recipient"),
                    ParameterSpec::bound("body", BindingKey::named("mail.body")),
                ],
                handler: sync_handler(|instance, parameters| {
                    let mailer = instance.downcast::<Mailer>().expect("not a mailer");
                    let recipient = parameters[0].clone().downcast::<String>().expect("recipient");
                    let body = parameters[1].clone().downcast::<String>().expect("body");
                    Ok(Arc::new(mailer.send(&recipient, &body)) as AnyInstancePtr)
                }),
            },
        )
        .expect("malformed method binding");

    let result = container
        .call(
            "Mailer@send",
            Arguments::new().with("recipient", "rust@example.com".to_string()),
            None,
        )
        .await
        .expect("invocation failed");

    // prints "to rust@example.com: hello"
    println!("{}", result.downcast::<String>().expect("not a string"));
}

use trellis_container::binding::{BindingKey, Producer};
use trellis_container::container::Container;

struct Greeter {
    greeting: String,
}

impl Greeter {
    fn greet(&self, who: &str) -> String {
        format!("{}, {}!", self.greeting, who)
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    let mut container = Container::new();

    // a literal value under a string alias
    container.bind(
        BindingKey::named("app.greeting"),
        Producer::value("Hello".to_string()),
        false,
    );

    // a singleton built through a factory which resolves its own dependency
    container.singleton(
        BindingKey::of::<Greeter>(),
        Producer::factory(|container| {
            let greeting =
                container.make_or(&BindingKey::named("app.greeting"), "Hi".to_string())?;
            Ok(Greeter {
                greeting: (*greeting).clone(),
            })
        }),
    );

    let greeter = container
        .make::<Greeter>(&BindingKey::of::<Greeter>())
        .expect("error resolving greeter")
        .expect("greeter is not bound");

    // prints "Hello, world!"
    println!("{}", greeter.greet("world"));
}

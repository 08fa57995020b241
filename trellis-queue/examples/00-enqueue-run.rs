use serde_json::json;
use trellis_queue::job::{JobCallback, JobDescriptor};
use trellis_queue::queue::Queue;
use trellis_queue::registry::{sync_callback_handler, sync_job_handler, JobRegistry};

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
#[tokio::main]
async fn main() {
    let mut registry = JobRegistry::new();
    registry.register_handler(
        "mail.send",
        sync_job_handler(|job| {
            println!("sending mail to {}", job.args[0]);
            Ok(json!("sent"))
        }),
    );
    registry.register_callback(
        "mail.sent",
        sync_callback_handler(|job, event| {
            println!("job {} settled: {event:?}", job.id);
            Ok(())
        }),
    );

    let mut queue = Queue::new("default");
    queue.enqueue(
        JobDescriptor::builder("mail.send")
            .arg(json!("rust@example.com"))
            .timeout(30)
            .on_success(JobCallback::new("mail.sent").expect("empty callback name"))
            .build(),
    );

    while let Some(job) = queue.dequeue() {
        let done = queue.run_sync(job, &registry).await;
        println!("{} -> {:?}", done.description(), done.status);
    }
}

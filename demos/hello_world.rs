use keel::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

attributed! {
    #[derive(Debug)]
    pub struct Lantern {
        pub lit: bool = false,
        pub brightness: f32 = 0.0,
        pub label: String = String::new(),
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    // reflection: registered types expose their members as named Datums
    Lantern::register();
    let mut lantern = Lantern::new();
    lantern.attribute_mut("lit").unwrap().set(0, true).unwrap();
    lantern.attribute_mut("brightness").unwrap().set(0, 0.8f32).unwrap();
    lantern.label = "harbor".to_string();
    tracing::info!(
        lit = lantern.lit,
        brightness = f64::from(lantern.brightness),
        label = lantern["label"].to_string().as_str(),
        "lantern configured through its attributes"
    );

    // tasks: a flicker task pumped by the engine loop
    let mut scheduler = Scheduler::new();
    let flickers = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&flickers);
    let handle = scheduler.handle();
    scheduler.start_keyed(
        "flicker",
        move || {
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 3 {
                handle.stop("flicker");
                return Ok(Step::Done);
            }
            Ok(Step::Sleep(Duration::from_millis(30)))
        },
        false,
    );

    while !scheduler.is_empty() {
        scheduler.update().expect("no task failures expected");
        std::thread::sleep(Duration::from_millis(10));
    }
    tracing::info!(flickers = flickers.load(Ordering::SeqCst), "done");
}

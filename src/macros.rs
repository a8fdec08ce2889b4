#![allow(unused_macros)]

/// Helper macro for locking a mutex, mapping poisoning onto [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex)?;
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let data = read_lock!(my_arc_rwlock)?;
///  println!("{}", data.some_field);
/// ```
macro_rules! read_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.read().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut data = write_lock!(my_arc_rwlock)?;
///  data.some_field = 42;
/// ```
macro_rules! write_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.write().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for timing a block and logging the elapsed time of a phase
///
/// ```rust, ignore
///  let value = timed!("type definitions", times, { merge_types(ctx)? });
/// ```
macro_rules! timed {
    ($phase:expr, $times:expr, $body:block) => {{
        let started = std::time::Instant::now();
        let value = $body;
        let elapsed = started.elapsed();
        log::info!("{} done in {:.2?}", $phase, elapsed);
        $times.push(($phase, elapsed));
        value
    }};
}

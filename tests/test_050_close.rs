mod test_utils;

use log::info;
use shmq::{create_pair, ShmqError, ShmqResult, Value};
use std::time::{Duration, Instant};

// cargo test test_050_close -- --nocapture
#[test]
fn test_050_close() -> ShmqResult<()> {
    let _log_handle = test_utils::init_logger();

    empty_and_timeout()?;
    idempotent_close()?;
    close_interrupts_blocked_get()?;
    sender_close_reaches_the_receiver()?;
    receiver_drop_reaches_the_sender()
}

fn empty_and_timeout() -> ShmqResult<()> {
    info!("an idle channel: get_nowait is Empty, a timed get elapses");
    let (_sender, receiver) = create_pair(Some(1));

    assert!(matches!(receiver.get_nowait(), Err(ShmqError::Empty)));

    let timeout = Duration::from_millis(300);
    let start = Instant::now();
    assert!(matches!(
        receiver.get_timeout(timeout),
        Err(ShmqError::Timeout)
    ));
    assert!(Instant::now().duration_since(start) >= timeout);
    Ok(())
}

fn idempotent_close() -> ShmqResult<()> {
    info!("closing twice succeeds, operations afterwards are BrokenChannel");
    let (sender, receiver) = create_pair(Some(1));
    sender.put(&Value::from(1))?;

    sender.close();
    sender.close();
    receiver.close();
    receiver.close();

    assert!(matches!(
        sender.put(&Value::from(2)),
        Err(ShmqError::BrokenChannel)
    ));
    assert!(matches!(
        sender.put_nowait(&Value::from(2)),
        Err(ShmqError::BrokenChannel)
    ));
    assert!(matches!(sender.has_space(), Err(ShmqError::BrokenChannel)));
    assert!(matches!(
        sender.wait_for_all_ack(),
        Err(ShmqError::BrokenChannel)
    ));
    assert!(matches!(receiver.get(), Err(ShmqError::BrokenChannel)));
    assert!(matches!(
        receiver.get_nowait(),
        Err(ShmqError::BrokenChannel)
    ));
    Ok(())
}

fn close_interrupts_blocked_get() -> ShmqResult<()> {
    info!("close on the receiver wakes a blocked get within one quantum");
    let (_sender, receiver) = create_pair(Some(1));

    std::thread::scope(|scope| {
        let worker = scope.spawn(|| receiver.get());
        std::thread::sleep(Duration::from_millis(150));
        let start = Instant::now();
        receiver.close();
        let result = worker.join().expect("blocked get panicked");
        assert!(matches!(result, Err(ShmqError::BrokenChannel)));
        assert!(Instant::now().duration_since(start) < Duration::from_secs(1));
    });
    Ok(())
}

fn sender_close_reaches_the_receiver() -> ShmqResult<()> {
    info!("after the sender closes, the receiver runs dry and breaks");
    let (sender, receiver) = create_pair(Some(2));
    sender.close();
    assert!(matches!(
        receiver.get_timeout(test_utils::patience()),
        Err(ShmqError::BrokenChannel)
    ));

    info!("a message in flight at close time is lost, not delivered");
    let (sender, receiver) = create_pair(Some(2));
    sender.put(&Value::from(1))?;
    sender.close(); // sweeps the yet-unmapped segment
    match receiver.get_timeout(test_utils::patience()) {
        Err(ShmqError::Segment { .. } | ShmqError::BrokenChannel) => {}
        Ok(value) => panic!("swept message was still delivered: {value:?}"),
        Err(e) => return Err(e),
    }
    assert!(matches!(
        receiver.get_nowait(),
        Err(ShmqError::BrokenChannel)
    ));
    Ok(())
}

fn receiver_drop_reaches_the_sender() -> ShmqResult<()> {
    info!("dropping the receiver eventually breaks the sender");
    let (sender, receiver) = create_pair(None);
    sender.put(&Value::from(1))?; // the ack drainer is running now
    drop(receiver);

    let deadline = Instant::now() + test_utils::patience();
    loop {
        match sender.put(&Value::from(2)) {
            Err(ShmqError::BrokenChannel) => return Ok(()),
            Ok(()) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(()) => panic!("sender never noticed the dropped receiver"),
            Err(e) => return Err(e),
        }
    }
}

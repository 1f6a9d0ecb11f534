mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{forwarding_callback, next_delivery, FakeHub, WAIT};
use messenger_endpoint::{
    BoxError, Error, Frame, FrameHandler, LoopState, Register, Transceiver, TransceiverConfig,
};
use messenger_fabric::codec::CodecKind;
use serde_json::json;
use tokio::sync::mpsc;

fn dispatch(signal: &str) -> Frame {
    Frame::dispatch("peer", signal, &json!({"n": 1}), None).unwrap()
}

#[tokio::test]
async fn frames_from_the_hub_reach_subscribers() {
    let hub = FakeHub::bind().await;
    let register = Register::new(&hub.config(200)).unwrap();
    let (cb, mut rx) = forwarding_callback();
    register.subscribe("tea_time", cb).unwrap();
    register.start().unwrap();

    let mut subscriber = hub.accept_subscriber().await;
    subscriber.send(&Frame::hub_present(&json!({"version": "1.2.3"})).unwrap()).await.unwrap();
    subscriber.send(&Frame::from_fields(["PING"])).await.unwrap();
    subscriber.send(&dispatch("tea_time")).await.unwrap();

    let message = next_delivery(&mut rx).await;
    assert_eq!(message.origin, "peer");
    assert_eq!(message.data, json!({"n": 1}));

    register.shutdown().await;
}

#[tokio::test]
async fn published_signal_comes_back_through_the_hub() {
    let hub = FakeHub::bind().await;
    let register = Register::new(&hub.config(200)).unwrap();
    let (cb, mut rx) = forwarding_callback();
    register.subscribe("tea_time", cb).unwrap();
    register.start().unwrap();
    let mut subscriber = hub.accept_subscriber().await;

    // Relay what was pushed back out, as the hub would
    let data = json!({"x": 1});
    let (published, pushed) = tokio::join!(
        register.publish("Tea_Time", &data),
        hub.collect_push()
    );
    published.unwrap();
    for frame in &pushed {
        subscriber.send(frame).await.unwrap();
    }

    let message = next_delivery(&mut rx).await;
    assert_eq!(message.origin, register.endpoint_id());
    assert_eq!(message.signal, "TEA_TIME");
    assert_eq!(message.data, json!({"x": 1}));
    assert_eq!(message.reply_to, None);

    register.shutdown().await;
}

#[tokio::test]
async fn json_codec_end_to_end() {
    let hub = FakeHub::bind_with(CodecKind::Json).await;
    let register = Register::new(&hub.config(200)).unwrap();
    let (cb, mut rx) = forwarding_callback();
    register.subscribe("tea_time", cb).unwrap();
    register.start().unwrap();

    let mut subscriber = hub.accept_subscriber().await;
    subscriber.send(&dispatch("tea_time")).await.unwrap();
    assert_eq!(next_delivery(&mut rx).await.data, json!({"n": 1}));

    register.shutdown().await;
}

#[tokio::test]
async fn stop_terminates_loop_within_idle_timeout() {
    let idle = Duration::from_millis(300);
    let hub = FakeHub::bind().await;
    let register = Register::new(&hub.config(idle.as_millis() as u64)).unwrap();
    let (cb, mut rx) = forwarding_callback();
    register.subscribe("tea_time", cb).unwrap();

    let mut state = register.state();
    assert_eq!(*state.borrow(), LoopState::Idle);

    register.start().unwrap();
    let mut subscriber = hub.accept_subscriber().await;
    subscriber.send(&dispatch("tea_time")).await.unwrap();
    next_delivery(&mut rx).await;
    assert_eq!(*state.borrow(), LoopState::Running);

    // Let the loop settle into a blocking poll, then stop it
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stopped_at = Instant::now();
    register.stop();

    tokio::time::timeout(idle + Duration::from_millis(200), state.wait_for(|s| *s == LoopState::Terminated))
        .await
        .expect("loop did not terminate in time")
        .unwrap();
    assert!(stopped_at.elapsed() <= idle + Duration::from_millis(200));

    // Nothing is dispatched after termination
    let _ = subscriber.send(&dispatch("tea_time")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let hub = FakeHub::bind().await;
    let register = Register::new(&hub.config(100)).unwrap();
    register.start().unwrap();
    assert!(matches!(register.start(), Err(Error::AlreadyStarted)));
    register.shutdown().await;
    assert!(matches!(register.start(), Err(Error::AlreadyStarted)));
}

#[tokio::test]
async fn register_refuses_a_started_transceiver() {
    let hub = FakeHub::bind().await;
    let transceiver = Transceiver::new(&hub.config(100)).unwrap();
    transceiver.start().unwrap();
    assert!(transceiver.is_started());

    let result = Register::with_transceiver(transceiver);
    assert!(matches!(result, Err(Error::AlreadyStarted)));
}

#[tokio::test]
async fn register_takes_over_an_idle_transceiver() {
    let hub = FakeHub::bind().await;
    let transceiver = Transceiver::new(&hub.config(100)).unwrap();
    assert!(!transceiver.is_started());

    let register = Register::with_transceiver(transceiver).unwrap();
    let (cb, mut rx) = forwarding_callback();
    register.subscribe("tea_time", cb).unwrap();
    register.start().unwrap();

    let mut subscriber = hub.accept_subscriber().await;
    subscriber.send(&dispatch("TEA_TIME")).await.unwrap();
    assert_eq!(next_delivery(&mut rx).await.signal, "TEA_TIME");
    register.shutdown().await;
}

#[test]
fn start_outside_runtime_fails() {
    let transceiver = Transceiver::new(&TransceiverConfig::default()).unwrap();
    assert!(matches!(transceiver.start(), Err(Error::NoRuntime)));
}

#[tokio::test]
async fn reconnects_after_hub_drops_connection() {
    let hub = FakeHub::bind().await;
    let register = Register::new(&hub.config(100)).unwrap();
    let (cb, mut rx) = forwarding_callback();
    register.subscribe("tea_time", cb).unwrap();
    register.start().unwrap();

    let first = hub.accept_subscriber().await;
    drop(first);

    let mut second = hub.accept_subscriber().await;
    second.send(&dispatch("tea_time")).await.unwrap();
    next_delivery(&mut rx).await;

    register.shutdown().await;
}

#[tokio::test]
async fn keeps_retrying_until_hub_appears() {
    // Reserve a port, then free it so the first attempts are refused
    let placeholder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = placeholder.local_addr().unwrap();
    drop(placeholder);

    let hub = FakeHub::bind().await;
    let config = TransceiverConfig {
        incoming: format!("tcp://{addr}"),
        ..hub.config(100)
    };
    let register = Register::new(&config).unwrap();
    let (cb, mut rx) = forwarding_callback();
    register.subscribe("tea_time", cb).unwrap();
    register.start().unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let late = messenger_fabric::transport::TcpTransportListener::bind(addr).await.unwrap();
    let (transport, _) = tokio::time::timeout(WAIT, late.accept()).await.unwrap().unwrap();
    let mut subscriber = messenger_fabric::Channel::from_transport(transport, CodecKind::Bincode);
    subscriber.send(&dispatch("tea_time")).await.unwrap();
    next_delivery(&mut rx).await;

    register.shutdown().await;
}

#[tokio::test]
async fn handler_failures_do_not_stop_the_loop() {
    let hub = FakeHub::bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler: Arc<dyn FrameHandler> = Arc::new(move |frame: Frame| -> Result<(), BoxError> {
        match frame.command() {
            Some("BOOM") => panic!("handler exploded"),
            Some("FAIL") => Err("handler refused".into()),
            _ => {
                tx.send(frame)?;
                Ok(())
            }
        }
    });
    let transceiver = Transceiver::with_handler(&hub.config(100), handler).unwrap();
    transceiver.start().unwrap();

    let mut subscriber = hub.accept_subscriber().await;
    subscriber.send(&Frame::from_fields(["BOOM"])).await.unwrap();
    subscriber.send(&Frame::from_fields(["FAIL"])).await.unwrap();
    subscriber.send(&Frame::sync()).await.unwrap();

    let frame = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(frame, Frame::sync());

    transceiver.shutdown().await;
}

#[tokio::test]
async fn send_rejects_non_command_frames_without_io() {
    let hub = FakeHub::bind().await;
    let transceiver = Transceiver::new(&hub.config(100)).unwrap();

    for frame in [Frame::default(), Frame::from_fields([" "])] {
        assert!(matches!(transceiver.send(&frame).await, Err(Error::OutboundMessage(_))));
    }

    let nothing = tokio::time::timeout(Duration::from_millis(200), hub.collect.accept()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn send_primes_with_sync_on_a_fresh_connection_each_time() {
    let hub = FakeHub::bind().await;
    let transceiver = Transceiver::new(&hub.config(100)).unwrap();

    for n in 0..2 {
        let frame = Frame::from_fields(["DISPATCH", "me", "TICK", n.to_string().as_str(), "0"]);
        let (sent, pushed) = tokio::join!(transceiver.send(&frame), hub.collect_push());
        sent.unwrap();
        assert_eq!(pushed, [Frame::sync(), frame]);
    }
}

#[tokio::test]
async fn send_to_absent_hub_is_a_transport_error() {
    let placeholder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = placeholder.local_addr().unwrap();
    drop(placeholder);

    let config = TransceiverConfig {
        outgoing: format!("tcp://{addr}"),
        ..TransceiverConfig::default()
    };
    let transceiver = Transceiver::new(&config).unwrap();
    let result = transceiver.send(&Frame::sync()).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[test]
fn deliver_hands_frames_to_the_handler_without_a_running_loop() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler: Arc<dyn FrameHandler> = Arc::new(move |frame: Frame| -> Result<(), BoxError> {
        if frame.command() == Some("BOOM") {
            panic!("handler exploded");
        }
        tx.send(frame)?;
        Ok(())
    });
    let transceiver = Transceiver::with_handler(&TransceiverConfig::default(), handler).unwrap();

    transceiver.deliver(Frame::from_fields(["BOOM"]));
    transceiver.deliver(dispatch("TICK"));

    assert_eq!(rx.try_recv().unwrap(), dispatch("TICK"));
    assert!(rx.try_recv().is_err());
}

#[test]
fn deliver_without_handler_discards() {
    let transceiver = Transceiver::new(&TransceiverConfig::default()).unwrap();
    transceiver.deliver(dispatch("TICK"));
    assert_eq!(*transceiver.state().borrow(), LoopState::Idle);
}

//! Toggle demo: a four-state machine driven from the tokio host.
//!
//! `INIT` kicks itself forward with a high-lane event from its own entry
//! callback, `TOGGLE` carries a string payload between `ON` and `OFF`, and
//! `END` lands the machine in `FIN`, which stops dispatch.
//!
//! Run with `RUST_LOG=debug cargo run --example toggle` to watch the
//! engine's enter/exit logging.

use std::sync::Arc;

use canopy_machine::{Machine, Policy};
use canopy_tokio::{init_tracing, TokioHost};
use tokio::sync::Notify;
use tracing::info;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum St {
    Init,
    Off,
    On,
    Fin,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Kind {
    InitComp,
    Toggle,
    End,
}

#[derive(Debug)]
enum Ev {
    InitComp,
    Toggle(String),
    End,
}

struct TogglePolicy;

impl Policy for TogglePolicy {
    type StateId = St;
    type Kind = Kind;
    type Event = Ev;

    fn kind_of(event: &Ev) -> Kind {
        match event {
            Ev::InitComp => Kind::InitComp,
            Ev::Toggle(_) => Kind::Toggle,
            Ev::End => Kind::End,
        }
    }

    fn state_name(id: St) -> &'static str {
        match id {
            St::Init => "INIT",
            St::Off => "OFF",
            St::On => "ON",
            St::Fin => "FIN",
        }
    }

    fn kind_name(kind: Kind) -> &'static str {
        match kind {
            Kind::InitComp => "INIT_COMP",
            Kind::Toggle => "TOGGLE",
            Kind::End => "END",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let host = TokioHost::new();
    let mut machine = Machine::<TogglePolicy>::new("Root", host.notifier());
    machine.create_states(&[St::Init, St::Off, St::On, St::Fin]);
    machine.add_transition(St::Init, Kind::InitComp, St::Off);
    machine.add_transition(St::Off, Kind::Toggle, St::On);
    machine.add_transition(St::On, Kind::Toggle, St::Off);
    machine.add_transition(St::On, Kind::End, St::Fin);
    machine.add_transition(St::Off, Kind::End, St::Fin);

    let handle = machine.handle();

    let kick = handle.clone();
    machine.on_state_entered(St::Init, move || {
        kick.send_high(Ev::InitComp);
        Ok(())
    });

    machine.on_transition(St::On, Kind::Toggle, |event| {
        if let Ev::Toggle(message) = event {
            info!(message = %message, "ON received TOGGLE");
        }
        Ok(())
    });

    let done = Arc::new(Notify::new());
    let finished = done.clone();
    let stopper = handle.clone();
    machine.on_state_entered(St::Fin, move || {
        info!("reached FIN");
        stopper.stop();
        finished.notify_one();
        Ok(())
    });

    machine.start();
    let running = host.spawn(machine);

    handle.send(Ev::Toggle("toggle1".to_string()));
    handle.send(Ev::Toggle("toggle2".to_string()));
    handle.send(Ev::Toggle("toggle3".to_string()));
    handle.send(Ev::End);

    done.notified().await;
    let machine = running.shutdown().await?;
    info!(stats = ?machine.stats(), "machine torn down");
    Ok(())
}

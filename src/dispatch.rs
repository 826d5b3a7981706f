// src/dispatch.rs
//! Routing of decoded distribution messages into local mailboxes.
//!
//! A frame is a control tuple optionally followed by a payload. The control
//! tuple carries its opcode in position 1. Only `REG_SEND`
//! (`{6, FromPid, Unused, ToName}`) is interpreted.

use crate::error::RouteError;
use crate::node::Node;
use crate::pid::Pid;
use crate::term::Term;
use tracing::trace;

/// `{2, Unused, ToPid}`; recognised, not routed.
pub const SEND: i64 = 2;
pub const REG_SEND: i64 = 6;

/// Route one decoded frame. Ticks (empty frames) are accepted and ignored.
pub async fn route(node: &Node, terms: Vec<Term>) -> Result<(), RouteError> {
    let mut terms = terms.into_iter();
    let control = match terms.next() {
        Some(control) => control,
        None => return Ok(()),
    };
    let payload = terms.next();
    let extra = terms.next();

    let opcode = opcode(&control)?;
    trace!(opcode, control = ?control, "distribution message");
    match opcode {
        REG_SEND => match (payload, extra) {
            (Some(payload), None) => reg_send(node, &control, payload).await,
            _ => Err(RouteError::MalformedRegSend),
        },
        other => Err(RouteError::UnsupportedOpcode(other)),
    }
}

fn opcode(control: &Term) -> Result<i64, RouteError> {
    match control.as_tuple() {
        Some(elements) if !elements.is_empty() => {}
        _ => return Err(RouteError::NotATuple),
    }
    control
        .element(1)
        .and_then(Term::as_integer)
        .ok_or(RouteError::MissingOpcode)
}

async fn reg_send(node: &Node, control: &Term, payload: Term) -> Result<(), RouteError> {
    if control.arity() != Some(4) {
        return Err(RouteError::MalformedRegSend);
    }
    let (from, to) = match (control.element(2), control.element(4)) {
        (Some(from), Some(to)) => (from.clone(), to),
        _ => return Err(RouteError::MalformedRegSend),
    };
    let to = resolve(node, to)?;
    trace!(from = ?from, to = %to, payload = ?payload, "REG_SEND");
    node.send_from(from, &to, payload).await?;
    Ok(())
}

/// A pid passes through; an atom is looked up in the registry.
fn resolve(node: &Node, dest: &Term) -> Result<Pid, RouteError> {
    match dest {
        Term::Pid(pid) => Ok(pid.clone()),
        Term::Atom(name) => node
            .whereis(name)
            .ok_or_else(|| RouteError::NameNotRegistered(name.clone())),
        _ => Err(RouteError::BadDestination),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::error::SendError;
    use crate::mailbox::Envelope;
    use crate::process::ProcessContext;
    use crate::SpawnConfig;
    use tokio::sync::mpsc;

    fn atom(s: &str) -> Term {
        Term::Atom(Atom::new(s))
    }

    fn reg_send_control(from: Term, to: Term) -> Term {
        Term::tuple([Term::from(REG_SEND), from, atom(""), to])
    }

    /// Spawn a process that forwards everything it gets to the returned
    /// channel.
    fn spawn_probe(node: &Node) -> (Pid, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pid = node.spawn_fn(SpawnConfig::default(), move |mut ctx: ProcessContext| async move {
            while let Some(env) = ctx.mailbox.recv().await {
                if tx.send(env).is_err() {
                    break;
                }
            }
        });
        (pid, rx)
    }

    #[tokio::test]
    async fn reg_send_to_registered_name() {
        let node = Node::new("d@localhost", "cookie").unwrap();
        let (pid, mut rx) = spawn_probe(&node);
        node.register(Atom::new("echo"), pid);

        let from = Term::Pid(Pid::new(Atom::new("peer@localhost"), 5, 0, 1));
        route(&node, vec![reg_send_control(from.clone(), atom("echo")), atom("hi")])
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Envelope::From { sender: from, payload: atom("hi") })
        );
    }

    #[tokio::test]
    async fn reg_send_to_pid() {
        let node = Node::new("d@localhost", "cookie").unwrap();
        let (pid, mut rx) = spawn_probe(&node);
        route(
            &node,
            vec![reg_send_control(atom("someone"), Term::Pid(pid)), Term::from(42)],
        )
        .await
        .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Envelope::From { sender: atom("someone"), payload: Term::from(42) })
        );
    }

    #[tokio::test]
    async fn unregistered_name_is_dropped() {
        let node = Node::new("d@localhost", "cookie").unwrap();
        let err = route(&node, vec![reg_send_control(atom("x"), atom("ghost")), atom("hi")])
            .await
            .unwrap_err();
        assert_eq!(err, RouteError::NameNotRegistered(Atom::new("ghost")));
    }

    #[tokio::test]
    async fn unknown_pid_is_not_found() {
        let node = Node::new("d@localhost", "cookie").unwrap();
        let ghost = Pid::new(Atom::new("d@localhost"), 999, 0, 0);
        let err = route(
            &node,
            vec![reg_send_control(atom("x"), Term::Pid(ghost.clone())), atom("hi")],
        )
        .await
        .unwrap_err();
        assert_eq!(err, RouteError::Send(SendError::NotFound(ghost)));
    }

    #[tokio::test]
    async fn malformed_frames() {
        let node = Node::new("d@localhost", "cookie").unwrap();
        assert_eq!(route(&node, vec![]).await, Ok(()));
        assert_eq!(
            route(&node, vec![atom("nope")]).await,
            Err(RouteError::NotATuple)
        );
        assert_eq!(
            route(&node, vec![Term::Tuple(Vec::new())]).await,
            Err(RouteError::NotATuple)
        );
        assert_eq!(
            route(&node, vec![Term::tuple([atom("six")])]).await,
            Err(RouteError::MissingOpcode)
        );
        // control tuple without payload
        assert_eq!(
            route(&node, vec![reg_send_control(atom("x"), atom("y"))]).await,
            Err(RouteError::MalformedRegSend)
        );
        // wrong arity
        assert_eq!(
            route(
                &node,
                vec![Term::tuple([Term::from(REG_SEND), atom("x")]), atom("hi")]
            )
            .await,
            Err(RouteError::MalformedRegSend)
        );
        assert_eq!(
            route(&node, vec![reg_send_control(atom("x"), Term::from(3)), atom("hi")]).await,
            Err(RouteError::BadDestination)
        );
    }

    #[tokio::test]
    async fn other_opcodes_are_unsupported() {
        let node = Node::new("d@localhost", "cookie").unwrap();
        let control = Term::tuple([Term::from(SEND), atom(""), atom("x")]);
        assert_eq!(
            route(&node, vec![control, atom("hi")]).await,
            Err(RouteError::UnsupportedOpcode(SEND))
        );
    }
}

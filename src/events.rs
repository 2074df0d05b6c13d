//! DOM-style event dispatch (spec §4.8): `addEventListener`/`removeEventListener`
//! semantics over the `document`/`window`/`canvas` targets, dispatched in that
//! fixed order for input events.
//!
//! Grounded on the native-function + JS-shim-string registration pattern in
//! `jhead-bevy-react`'s `js/websocket.rs` (`register_websocket_functions` /
//! `register_websocket_shim`), generalized from a single WebSocket connection
//! to the DOM event-target table.

use boa_engine::{Context, JsError, JsNativeError, JsResult, JsValue};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Document,
    Window,
    Canvas,
}

impl EventTarget {
    /// Dispatch order for input events (spec §4.8).
    pub const DISPATCH_ORDER: [EventTarget; 3] = [EventTarget::Document, EventTarget::Window, EventTarget::Canvas];
}

struct Listener {
    callback: JsValue,
    capture: bool,
}

/// `target -> event_name -> ordered listeners`. Registration order is
/// preserved; `boa_engine`'s `JsValue` already keeps the underlying function
/// object alive for as long as this table holds it (see `loader::cache`'s
/// `ProtectedHandle` doc comment for why no separate protect call is
/// needed).
#[derive(Default)]
pub struct EventListenerTable {
    listeners: HashMap<EventTarget, HashMap<String, Vec<Listener>>>,
}

impl EventListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, target: EventTarget, event_name: &str, callback: JsValue, capture: bool) {
        self.listeners
            .entry(target)
            .or_default()
            .entry(event_name.to_string())
            .or_default()
            .push(Listener { callback, capture });
    }

    /// Removes the first listener registered for `(target, event_name)` with
    /// the same callback identity and capture flag, matching
    /// `removeEventListener`'s contract.
    pub fn remove_listener(&mut self, target: EventTarget, event_name: &str, callback: &JsValue, capture: bool) {
        if let Some(by_event) = self.listeners.get_mut(&target) {
            if let Some(list) = by_event.get_mut(event_name) {
                if let Some(idx) = list.iter().position(|l| l.capture == capture && l.callback.strict_equals(callback)) {
                    list.remove(idx);
                }
            }
        }
    }

    /// Invokes every listener registered for `event_name` on `target`, in
    /// registration order, passing `event_object` as the sole argument.
    fn dispatch_one(&self, target: EventTarget, event_name: &str, event_object: &JsValue, context: &mut Context) -> JsResult<()> {
        let Some(by_event) = self.listeners.get(&target) else { return Ok(()) };
        let Some(list) = by_event.get(event_name) else { return Ok(()) };

        for listener in list {
            if let Some(callable) = listener.callback.as_callable() {
                callable.call(&JsValue::undefined(), &[event_object.clone()], context)?;
            }
        }
        Ok(())
    }

    /// Dispatch an input event (keyboard/mouse/pointer/wheel) across
    /// `document -> window -> canvas` in that order.
    pub fn dispatch_input_event(&self, event_name: &str, event_object: &JsValue, context: &mut Context) -> JsResult<()> {
        for target in EventTarget::DISPATCH_ORDER {
            self.dispatch_one(target, event_name, event_object, context)?;
        }
        Ok(())
    }

    /// Gamepad events and resize updates go to `window` only.
    pub fn dispatch_to_window(&self, event_name: &str, event_object: &JsValue, context: &mut Context) -> JsResult<()> {
        self.dispatch_one(EventTarget::Window, event_name, event_object, context)
    }
}

/// Builds a plain event object with no-op `preventDefault`/`stopPropagation`,
/// per spec §4.8.
pub fn make_event_object(fields: &[(&str, JsValue)], context: &mut Context) -> JsResult<JsValue> {
    let object = boa_engine::JsObject::with_object_proto(context.intrinsics());
    for (key, value) in fields {
        object.set(boa_engine::JsString::from(*key), value.clone(), true, context)?;
    }

    let noop = boa_engine::NativeFunction::from_fn_ptr(|_this, _args, _ctx| Ok(JsValue::undefined()));
    let noop_fn = boa_engine::object::FunctionObjectBuilder::new(context.realm(), noop).build();
    object.set(boa_engine::JsString::from("preventDefault"), noop_fn.clone(), true, context)?;
    object.set(boa_engine::JsString::from("stopPropagation"), noop_fn, true, context)?;

    Ok(object.into())
}

pub fn resolve_target(name: &str) -> JsResult<EventTarget> {
    match name {
        "document" => Ok(EventTarget::Document),
        "window" => Ok(EventTarget::Window),
        "canvas" => Ok(EventTarget::Canvas),
        other => Err(JsError::from_native(JsNativeError::typ().with_message(format!("unknown event target '{other}'")))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::{JsString, NativeFunction};
    use boa_gc::{Finalize, Trace, empty_trace};

    struct NonGc<T>(T);

    impl<T> Finalize for NonGc<T> {}
    // SAFETY: `T` here is always plain Rust test state, never a value
    // containing `boa_gc`-managed pointers.
    unsafe impl<T> Trace for NonGc<T> {
        empty_trace!();
    }

    #[test]
    fn dispatch_visits_document_then_window_then_canvas() {
        let mut context = Context::default();
        let mut table = EventListenerTable::new();

        let order = std::rc::Rc::new(std::cell::RefCell::new(Vec::<&'static str>::new()));
        for (target, label) in [
            (EventTarget::Canvas, "canvas"),
            (EventTarget::Document, "document"),
            (EventTarget::Window, "window"),
        ] {
            let order = order.clone();
            let native = NativeFunction::from_copy_closure_with_captures(
                move |_this, _args, captures: &NonGc<(std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>, &'static str)>, _ctx| {
                    let (order, label) = &captures.0;
                    order.borrow_mut().push(label);
                    Ok(JsValue::undefined())
                },
                NonGc((order, label)),
            );
            let func = boa_engine::object::FunctionObjectBuilder::new(context.realm(), native).build();
            table.add_listener(target, "click", func.into(), false);
        }

        let event = make_event_object(&[("type", JsValue::from(JsString::from("click")))], &mut context).unwrap();
        table.dispatch_input_event("click", &event, &mut context).unwrap();

        assert_eq!(*order.borrow(), vec!["document", "window", "canvas"]);
    }
}

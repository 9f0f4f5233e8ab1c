//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when effect handlers build `Effect::Future`
//! and `Effect::Delay` values.

/// Create an `Effect::Future` from an async block body
///
/// The body must evaluate to `Option<Action>`.
///
/// # Example
///
/// ```rust,ignore
/// use caption_client_core::async_effect;
///
/// let correlator = Arc::clone(&env.correlator);
/// async_effect! {
///     let response = correlator.request(MessageType::GetBookings, json!({})).await;
///     Some(AppAction::BookingsLoaded(response))
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(::std::boxed::Box::pin(async move { $($body)* }))
    };
}

/// Create an `Effect::Delay` dispatching `action` after `duration`
///
/// # Example
///
/// ```rust,ignore
/// use caption_client_core::delay;
///
/// delay! {
///     duration: Duration::from_millis(0),
///     action: AppAction::AuthFailureAcknowledged
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (duration: $duration:expr, action: $action:expr) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use std::time::Duration;

    #[tokio::test]
    async fn test_async_effect_macro() {
        let value = 41_u32;
        let effect: Effect<u32> = async_effect! {
            Some(value + 1)
        };

        let Effect::Future(fut) = effect else {
            unreachable!("async_effect builds a future effect");
        };
        assert_eq!(fut.await, Some(42));
    }

    #[test]
    fn test_delay_macro() {
        let effect: Effect<&str> = delay! {
            duration: Duration::from_millis(5),
            action: "tick"
        };

        match effect {
            Effect::Delay { duration, action } => {
                assert_eq!(duration, Duration::from_millis(5));
                assert_eq!(*action, "tick");
            },
            other => unreachable!("unexpected effect: {other:?}"),
        }
    }
}

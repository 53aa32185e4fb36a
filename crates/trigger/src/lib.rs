//! Trigcam Trigger
//!
//! Produces the synchronization pulse every camera exposes on. Two
//! interchangeable variants sit behind [`TriggerController`]:
//!
//! - **Self-timed** ([`GpioTrigger`]): a local thread toggles a USB GPIO
//!   module line once per period.
//! - **Delegated** ([`ArduinoTrigger`]): a microcontroller receives one start
//!   command and free-runs the pulse until told to stop.
//!
//! Both speak a line-oriented command protocol over a [`TriggerPort`].

pub mod arduino;
pub mod controller;
pub mod gpio;
pub mod port;

pub use arduino::ArduinoTrigger;
pub use controller::*;
pub use gpio::GpioTrigger;
pub use port::*;

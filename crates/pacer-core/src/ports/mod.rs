//! Ports - 外部との境界
//!
//! キューが直接依存すべきでないもの (壁時計、ID の乱数、イベントの消費者) を
//! trait の裏に隠し、テストで差し替えられるようにする。

pub mod clock;
pub mod event_sink;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};

//! Order aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use events::{
    OrderCancelledData, OrderConfirmedData, OrderCreatedData, OrderDeliveredData, OrderEvent,
    OrderReturnedData, OrderShippedData,
};
pub use state::{OrderOperation, OrderStatus, PaymentOperation, PaymentStatus};
pub use value_objects::{CustomerId, Money, OrderLine, ProductId};

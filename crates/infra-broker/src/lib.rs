mod pgmq_broker;

pub use pgmq_broker::PgmqBroker;

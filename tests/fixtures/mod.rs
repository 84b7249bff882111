#![allow(dead_code)]

pub mod fake_transport;
pub mod stomp_broker;

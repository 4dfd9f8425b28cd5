//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use uuid::Uuid;

use crate::models::{Appointment, ConsultationRoom, Message, RoomStatus};

/// Validate that an appointment's state is internally consistent
pub fn assert_appointment_invariants(appointment: &Appointment) {
    debug_assert!(
        !appointment.slots.is_empty(),
        "Appointment {} has no slots",
        appointment.id
    );

    debug_assert!(
        appointment.slots.windows(2).all(|w| w[0] < w[1]),
        "Appointment {} slot list is not sorted/deduplicated",
        appointment.id
    );

    let expected = appointment.price_per_slot * appointment.slots.len() as f64;
    debug_assert!(
        (appointment.total_amount - expected).abs() < f64::EPSILON,
        "Appointment {} total {} does not match {} slots at {}",
        appointment.id,
        appointment.total_amount,
        appointment.slots.len(),
        appointment.price_per_slot
    );

    debug_assert!(
        appointment.provider_id != appointment.client_id,
        "Appointment {} has the same user in both seats",
        appointment.id
    );
}

/// Validate that a room's timestamps agree with its status
pub fn assert_room_invariants(room: &ConsultationRoom) {
    match room.status {
        RoomStatus::Ready => {
            debug_assert!(
                room.started_at.is_none() && room.ended_at.is_none(),
                "Ready room {} carries session timestamps",
                room.id
            );
        }
        RoomStatus::Active => {
            debug_assert!(
                room.started_at.is_some() && room.ended_at.is_none(),
                "Active room {} has inconsistent timestamps",
                room.id
            );
        }
        RoomStatus::Ended => {
            debug_assert!(
                room.started_at.is_some() && room.ended_at.is_some(),
                "Ended room {} has inconsistent timestamps",
                room.id
            );
            debug_assert!(
                room.ended_at >= room.started_at,
                "Room {} ended before it started",
                room.id
            );
        }
    }
}

/// Validate that a message batch is in total order for its room
pub fn assert_message_order(messages: &[Message]) {
    debug_assert!(
        messages.windows(2).all(|w| w[0].order_key() < w[1].order_key()),
        "Message batch violates (timestamp, sequence) order"
    );
}

/// Validate that a user ID is not nil
pub fn assert_user_id_valid(user_id: Uuid, context: &str) {
    debug_assert!(user_id != Uuid::nil(), "Nil user_id in context: {}", context);
}

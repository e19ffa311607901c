//! One-time node provisioning and chat room reconciliation.

use std::path::Path;
use std::time::Duration;

use log::{debug, info};

use crate::config::XeresConfig;
use crate::control::{ChatRoom, ChatRooms, ControlClient};
use crate::error::Result;

const AVATAR: &str = "avatar.png";
const ROOM_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Creates profile, location and identity on a fresh node, then adds friends.
pub async fn provision(control: &ControlClient, config: &XeresConfig) -> Result<()> {
    if control.has_profile().await? {
        debug!("Profile already exists");
    } else {
        info!("Creating profile '{}'", config.profile_name);
        control.create_profile(&config.profile_name).await?;
        control.create_location(&config.location_name).await?;
        control.create_identity(&config.profile_name).await?;

        let avatar = Path::new(AVATAR);
        if avatar.is_file() {
            info!("Uploading avatar");
            control.upload_avatar(avatar).await?;
        }
    }

    for friend in &config.friend_ids {
        debug!("Adding friend {friend}");
        control.add_friend(friend).await?;
    }
    Ok(())
}

/// What to do with the rooms currently known to the node.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RoomPlan {
    /// Wanted rooms that are available but not joined yet
    pub subscribe: Vec<ChatRoom>,
    /// Wanted rooms the node doesn't know about yet
    pub pending: Vec<String>,
}

#[must_use]
pub fn plan_rooms(wanted: &[String], rooms: &ChatRooms) -> RoomPlan {
    let mut plan = RoomPlan::default();
    for name in wanted {
        if rooms.subscribed.iter().any(|room| &room.name == name) {
            continue;
        }
        match rooms.available.iter().find(|room| &room.name == name) {
            Some(room) => plan.subscribe.push(room.clone()),
            None => plan.pending.push(name.clone()),
        }
    }
    plan
}

/// Joined rooms that aren't in the wanted set.
#[must_use]
pub fn unwanted_rooms(wanted: &[String], rooms: &ChatRooms) -> Vec<ChatRoom> {
    rooms
        .subscribed
        .iter()
        .filter(|room| !wanted.contains(&room.name))
        .cloned()
        .collect()
}

/// Joins every wanted room, waiting for unknown ones to show up, then leaves the rest.
pub async fn synchronize_rooms(control: &ControlClient, wanted: &[String]) -> Result<()> {
    info!("Syncing chatrooms...");

    loop {
        let plan = plan_rooms(wanted, &control.chat_rooms().await?);
        for room in &plan.subscribe {
            info!("Subscribing to room {} with id {}", room.name, room.id);
            control.subscribe_room(room.id).await?;
        }
        if plan.pending.is_empty() {
            break;
        }
        debug!("Waiting for rooms to appear: {}", plan.pending.join(", "));
        tokio::time::sleep(ROOM_POLL_INTERVAL).await;
    }

    for room in unwanted_rooms(wanted, &control.chat_rooms().await?) {
        info!("Leaving room {} with id {}", room.name, room.id);
        control.leave_room(room.id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: i64, name: &str) -> ChatRoom {
        ChatRoom {
            id,
            name: name.to_string(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn plans_subscriptions_for_available_rooms() {
        let rooms = ChatRooms {
            subscribed: vec![room(1, "Lobby")],
            available: vec![room(2, "Rust"), room(3, "Music")],
        };

        let plan = plan_rooms(&names(&["Lobby", "Rust", "Later"]), &rooms);

        assert_eq!(
            plan,
            RoomPlan {
                subscribe: vec![room(2, "Rust")],
                pending: names(&["Later"]),
            }
        );
    }

    #[test]
    fn nothing_to_do_when_all_joined() {
        let rooms = ChatRooms {
            subscribed: vec![room(1, "Lobby")],
            available: Vec::new(),
        };
        assert_eq!(plan_rooms(&names(&["Lobby"]), &rooms), RoomPlan::default());
    }

    #[test]
    fn finds_rooms_to_leave() {
        let rooms = ChatRooms {
            subscribed: vec![room(1, "Lobby"), room(4, "Old")],
            available: vec![room(5, "Other")],
        };
        assert_eq!(unwanted_rooms(&names(&["Lobby"]), &rooms), vec![room(4, "Old")]);
    }
}

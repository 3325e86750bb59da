// Presentation surface creation
//
// Maps the platform window handles onto the matching VK_KHR_*_surface
// extension. Supported window systems: Win32, Xlib, Xcb and Wayland.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;
use std::ptr::{self, NonNull};

use crate::error::FatalError;

/// Instance extensions needed to create a surface on this display
pub fn required_instance_extensions(
    display_handle: RawDisplayHandle,
) -> Result<Vec<&'static CStr>, FatalError> {
    let platform = match display_handle {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => return Err(FatalError::UnsupportedPlatform(display_name(&other))),
    };

    Ok(vec![khr::Surface::name(), platform])
}

/// Create a surface for the window.
///
/// # Safety
/// The handles must stay valid until the surface is destroyed, and the
/// instance must have been created with `required_instance_extensions`.
pub unsafe fn create_surface(
    entry: &Entry,
    instance: &ash::Instance,
    display_handle: RawDisplayHandle,
    window_handle: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    match (display_handle, window_handle) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(window)) => {
            let hinstance = window
                .hinstance
                .map_or(ptr::null_mut(), |h| h.get() as *mut std::ffi::c_void);
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(window.hwnd.get() as *mut std::ffi::c_void);

            khr::Win32Surface::new(entry, instance)
                .create_win32_surface(&create_info, None)
                .context("Failed to create Win32 surface")
        }

        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display.display.map_or(ptr::null_mut(), NonNull::as_ptr);
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.cast())
                .window(window.window);

            khr::XlibSurface::new(entry, instance)
                .create_xlib_surface(&create_info, None)
                .context("Failed to create Xlib surface")
        }

        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
            let connection = display.connection.map_or(ptr::null_mut(), NonNull::as_ptr);
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection)
                .window(window.window.get());

            khr::XcbSurface::new(entry, instance)
                .create_xcb_surface(&create_info, None)
                .context("Failed to create Xcb surface")
        }

        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(window.surface.as_ptr());

            khr::WaylandSurface::new(entry, instance)
                .create_wayland_surface(&create_info, None)
                .context("Failed to create Wayland surface")
        }

        (other, _) => Err(FatalError::UnsupportedPlatform(display_name(&other)).into()),
    }
}

fn display_name(handle: &RawDisplayHandle) -> &'static str {
    match handle {
        RawDisplayHandle::Windows(_) => "Windows",
        RawDisplayHandle::Xlib(_) => "Xlib",
        RawDisplayHandle::Xcb(_) => "Xcb",
        RawDisplayHandle::Wayland(_) => "Wayland",
        RawDisplayHandle::AppKit(_) => "AppKit",
        RawDisplayHandle::UiKit(_) => "UIKit",
        RawDisplayHandle::Android(_) => "Android",
        RawDisplayHandle::Web(_) => "Web",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{AppKitDisplayHandle, WindowsDisplayHandle};

    #[test]
    fn windows_needs_win32_surface() {
        let extensions =
            required_instance_extensions(RawDisplayHandle::Windows(WindowsDisplayHandle::new()))
                .unwrap();

        assert_eq!(extensions, vec![c"VK_KHR_surface", c"VK_KHR_win32_surface"]);
    }

    #[test]
    fn appkit_is_unsupported() {
        let err = required_instance_extensions(RawDisplayHandle::AppKit(AppKitDisplayHandle::new()))
            .unwrap_err();

        assert!(matches!(err, FatalError::UnsupportedPlatform("AppKit")));
    }
}
